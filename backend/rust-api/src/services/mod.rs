use crate::config::Config;
use crate::middlewares::auth::JwtService;
use crate::middlewares::rate_limit::RateLimiter;
use mongodb::{Client as MongoClient, Database};

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub jwt: JwtService,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// The client connects lazily, so building state never touches the network
    pub fn new(config: Config, mongo_client: MongoClient) -> Self {
        let mongo = mongo_client.database(&config.mongo_database);
        let jwt = JwtService::new(&config.jwt_secret, config.jwt_ttl_seconds);
        let rate_limiter = RateLimiter::new(&config.rate_limit);

        Self {
            config,
            mongo,
            jwt,
            rate_limiter,
        }
    }
}

pub mod assignment_service;
pub mod auth_service;
pub mod course_service;
pub mod lookup;
pub mod notification_service;
pub mod seed;
pub mod user_service;
