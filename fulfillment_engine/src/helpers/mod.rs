mod order_id;
mod text;

pub use order_id::{random_order_id, OrderIdGenerator};
pub use text::{non_blank, normalize_reason, DEFAULT_CANCELLATION_REASON};
