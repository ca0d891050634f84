//! Proration of money amounts across an order split.
//!
//! All rounding that a split introduces happens here. `allocate` rounds
//! the part half-up and hands the leftover paisa to the remainder side;
//! `allocate_sequence` additionally corrects aggregate drift on the last
//! element, so a long installment history divides to the same total as
//! dividing the sum once.

use super::Money;

/// One amount divided in two. `part + remainder == amount` always.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Split {
    pub part: Money,
    pub remainder: Money,
}

/// Divides `amount` at `ratio` (in `[0, 1]`), rounding the part half-up
/// to the paisa and clamping it into `[0, amount]`.
pub fn allocate(amount: Money, ratio: f64) -> Split {
    debug_assert!((0.0..=1.0).contains(&ratio), "split ratio out of range: {ratio}");
    let raw = amount.minor() as f64 * ratio;
    let part = ((raw + 0.5).floor() as i64).clamp(0, amount.minor());
    Split {
        part: Money::from_minor(part),
        remainder: Money::from_minor(amount.minor() - part),
    }
}

/// Divides every amount at `ratio`, then adjusts the LAST element's
/// split so that `sum(parts) == allocate(sum(amounts), ratio).part`
/// exactly. The correction can push the last part a few paise past its
/// own amount; per-element conservation (`part + remainder == amount`)
/// still holds.
pub fn allocate_sequence(amounts: &[Money], ratio: f64) -> (Vec<Money>, Vec<Money>) {
    let mut parts: Vec<i64> = amounts
        .iter()
        .map(|a| allocate(*a, ratio).part.minor())
        .collect();

    let total: Money = amounts.iter().copied().sum();
    let target = allocate(total, ratio).part.minor();
    let drift = target - parts.iter().sum::<i64>();
    if let Some(last) = parts.last_mut() {
        *last += drift;
    }

    let remainders: Vec<Money> = amounts
        .iter()
        .zip(&parts)
        .map(|(amount, part)| Money::from_minor(amount.minor() - part))
        .collect();
    (parts.into_iter().map(Money::from_minor).collect(), remainders)
}
