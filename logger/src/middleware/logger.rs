use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr},
    rc::Rc,
    str::FromStr,
    sync::Arc,
    time::Instant,
};

use actix_web::{
    Error,
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    web,
};
use chrono::Utc;
use colored::Colorize;
use common::{env_config::Config, jwt::get_jwt_claims_or_error};
use db::models::log::Log;
use futures::future::{LocalBoxFuture, Ready, ready};
use log::info;
use serde_json::{Value, json};
use sqlx::{PgPool, types::ipnetwork::IpNetwork};
use uuid::Uuid;

pub struct LoggerMiddleware {}

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self {}
    }
}

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = LoggerMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let started = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let params = query_params(req.query_string());

        let ip_address = req
            .connection_info()
            .realip_remote_addr()
            .and_then(parse_ip)
            .unwrap_or_else(|| IpNetwork::from(IpAddr::V4(Ipv4Addr::UNSPECIFIED)));

        let user_agent = req
            .headers()
            .get("User-Agent")
            .and_then(|ua| ua.to_str().ok())
            .unwrap_or_default()
            .to_string();

        // claims are only present once the extractor has run
        let user_id = get_jwt_claims_or_error(&req).ok().map(|c| c.user_id);
        let console_logging_enabled = req
            .app_data::<web::Data<Arc<Config>>>()
            .is_none_or(|config| config.console_logging_enabled);
        let pool = req.app_data::<web::Data<Arc<PgPool>>>().cloned();
        let srv = Rc::clone(&self.service);

        Box::pin(async move {
            let res = srv.call(req).await?;
            let status_code = i32::from(res.status().as_u16());
            let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

            if console_logging_enabled {
                let colored_status = match status_code {
                    200..=299 => status_code.to_string().green(),
                    300..=399 => status_code.to_string().yellow(),
                    400..=499 => status_code.to_string().bright_red(),
                    _ => status_code.to_string().red(),
                };

                let colored_method = match method.as_str() {
                    "GET" => method.blue(),
                    "POST" => method.yellow(),
                    "PUT" => method.purple(),
                    "DELETE" => method.red(),
                    _ => method.normal(),
                };

                info!(
                    "[{}] {} {} {} user_id={} params={}",
                    colored_status,
                    colored_method,
                    path.bright_white(),
                    format!("({}ms)", duration_ms).bright_black(),
                    user_id
                        .map_or("None".to_string(), |id| id.to_string())
                        .bright_blue(),
                    params.to_string().bright_cyan(),
                );
            }

            if let Some(pool) = pool {
                let entry = Log {
                    id: Uuid::nil(), // auto-generated
                    timestamp: Utc::now().naive_utc(),
                    method,
                    path,
                    status_code,
                    duration_ms,
                    user_id,
                    params: Some(params),
                    ip_address,
                    user_agent,
                };
                if let Err(e) = db::log::insert_log(pool.get_ref().as_ref(), entry).await {
                    log::warn!("Failed to persist request log: {}", e);
                }
            }

            Ok(res.map_into_boxed_body())
        })
    }
}

fn parse_ip(addr: &str) -> Option<IpNetwork> {
    let host = addr
        .parse::<std::net::SocketAddr>()
        .map(|socket| socket.ip().to_string())
        .unwrap_or_else(|_| addr.to_string());
    IpNetwork::from_str(&host).ok()
}

/// Query string as a JSON object; flags without a value become `true`.
pub fn query_params(query_string: &str) -> Value {
    let params: HashMap<&str, Value> = query_string
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key, json!(value)),
            None => (pair, json!(true)),
        })
        .collect();
    json!(params)
}
