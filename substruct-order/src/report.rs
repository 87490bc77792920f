use serde::Serialize;
use chrono::Datelike;
use substruct_shared::Cents;

use crate::models::Order;

/// Sales figures for a year or one of its months.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SalesTotals {
    /// 0 for the whole year, 1..=12 for a month.
    pub month: u32,
    pub number_of_sales: u64,
    pub sales_total_cents: Cents,
    pub tax_cents: Cents,
    pub shipping_cents: Cents,
}

impl SalesTotals {
    fn add(&mut self, order: &Order) {
        self.number_of_sales += 1;
        self.sales_total_cents += order.product_cost_cents;
        self.tax_cents += order.tax_cost();
        self.shipping_cents += order.shipping_cost_cents;
    }
}

/// Thirteen entries: index 0 covers the year, 1..=12 the months. Only orders with
/// status 5, 6 or 7 created in `year` are counted.
pub fn totals_for_year(orders: &[Order], year: i32) -> Vec<SalesTotals> {
    let mut totals: Vec<SalesTotals> = (0..=12)
        .map(|month| SalesTotals { month, ..Default::default() })
        .collect();

    for order in orders
        .iter()
        .filter(|o| o.created_at.year() == year && (5..=7).contains(&o.status.code()))
    {
        totals[0].add(order);
        totals[order.created_at.month() as usize].add(order);
    }

    totals
}
