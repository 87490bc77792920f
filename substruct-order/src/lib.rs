pub mod address;
pub mod models;
pub mod repository;
pub mod memory;
pub mod manager;
pub mod orchestrator;
pub mod mail;
pub mod ipn;
pub mod affiliate;
pub mod report;

pub use address::{Address, AddressError};
pub use models::{Order, OrderLineItem, OrderNote, OrderStatus, PaymentAccount, PromotionOutcome};
pub use repository::{AffiliateRepository, OrderRepository};
pub use memory::{InMemoryAffiliateRepository, InMemoryOrderRepository};
pub use manager::{CheckoutDetails, OrderError, OrderService};
pub use orchestrator::{PaymentOrchestrator, TransactionOutcome};
pub use ipn::{IpnError, IpnOutcome, IpnReconciler};
pub use affiliate::{Affiliate, AffiliateError, AffiliatePayment, AffiliateService};
pub use report::SalesTotals;
