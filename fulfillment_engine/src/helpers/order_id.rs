use chrono::NaiveDate;
use rand::Rng;

use crate::db_types::OrderId;

/// Produces candidate external order ids for a placement date.
pub type OrderIdGenerator = fn(NaiveDate) -> OrderId;

/// `ORD-YYYYMMDD-NNNN` with a random four-digit suffix.
pub fn random_order_id(date: NaiveDate) -> OrderId {
    let suffix = rand::thread_rng().gen_range(0..10_000u16);
    OrderId::from_parts(date, suffix)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn random_ids_are_well_formed() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        for _ in 0..100 {
            let id = random_order_id(date);
            assert!(id.is_well_formed(), "{id}");
            assert!(id.as_str().starts_with("ORD-20241231-"));
        }
    }
}
