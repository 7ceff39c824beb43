//! Price arithmetic and currency rendering.
//!
//! All amounts are whole cents, so subtotals and totals are exact and need
//! no re-rounding after summation.

use crate::types::{Money, OrderItem};

/// `price * quantity` for one cart line.
#[must_use]
pub const fn item_subtotal(price: Money, quantity: u32) -> Money {
    price.times(quantity)
}

/// Sum of the line subtotals.
#[must_use]
pub fn order_total(items: &[OrderItem]) -> Money {
    items.iter().map(|item| item.subtotal).sum()
}

/// Renders an amount as US dollars, e.g. `$1,234.50` or `-$3.00`.
#[must_use]
pub fn format_currency(amount: Money) -> String {
    let cents = amount.cents().unsigned_abs();
    let dollars = group_thousands(cents / 100);
    let sign = if amount.is_negative() { "-" } else { "" };
    format!("{sign}${dollars}.{:02}", cents % 100)
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}
