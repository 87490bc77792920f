pub mod models;
pub mod rules;
pub mod codes;
pub mod repository;

pub use models::{Discount, Promotion, PromotionError};
pub use rules::{check_eligibility, compute_discount, CartLine, CartSnapshot, DiscountLine, Ineligibility};
pub use repository::{InMemoryPromotionRepository, PromotionRepository};
