pub mod app_config;
pub mod database;
pub mod order_repo;
pub mod catalog_repo;
pub mod promotion_repo;
pub mod affiliate_repo;
pub mod mail_outbox;
pub mod gateway;

pub use app_config::Config;
pub use database::DbClient;
pub use order_repo::PostgresOrderRepository;
pub use catalog_repo::PostgresItemRepository;
pub use promotion_repo::PostgresPromotionRepository;
pub use affiliate_repo::PostgresAffiliateRepository;
pub use mail_outbox::PostgresMailOutbox;
pub use gateway::{AuthorizeNetGateway, PaypalIpnVerifier};
