use stripe::{Client, CreateCustomer, Customer, CustomerId};

use crate::error::{AppError, Res};

pub fn create_client(secret_key: &str) -> Client {
    Client::new(secret_key)
}

pub async fn create_customer(client: &Client, email: &str) -> Res<Customer> {
    let params = CreateCustomer {
        email: Some(email),
        ..Default::default()
    };

    Customer::create(client, params)
        .await
        .map_err(AppError::from)
}

pub fn parse_customer_id(customer_id: &str) -> Res<CustomerId> {
    customer_id
        .parse::<CustomerId>()
        .map_err(|e| AppError::BadRequest(format!("Invalid customer ID: {}", e)))
}
