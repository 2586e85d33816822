//! Jurisdiction-style fee schedule for simulated fills.
//!
//! Charges are a pure function of side, quantity, price and product type:
//!
//! - **Brokerage**: intraday only, a percentage of turnover capped per order
//! - **Transaction tax**: intraday on SELL only, delivery on both sides
//! - **Exchange / regulatory charges**: a fraction of turnover, both sides
//! - **Stamp duty**: BUY only, rate depends on the product type
//! - **Settlement charge**: flat fee on delivery SELL
//! - **Service tax**: levied on brokerage + exchange + regulatory charges

use crate::types::{round2, ChargeBreakdown, ProductType, Side};
use serde::{Deserialize, Serialize};

/// Fee rates. Percentages are expressed as fractions (0.0003 = 0.03%).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeeSchedule {
    pub brokerage_rate: f64,
    pub brokerage_cap: f64,
    pub intraday_tax_rate: f64,
    pub delivery_tax_rate: f64,
    pub exchange_rate: f64,
    pub regulatory_rate: f64,
    pub delivery_stamp_rate: f64,
    pub intraday_stamp_rate: f64,
    pub settlement_charge: f64,
    pub service_tax_rate: f64,
    /// Flat brokerage per order replacing the percentage brokerage
    pub commission_override: Option<f64>,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            brokerage_rate: 0.0003,
            brokerage_cap: 20.0,
            intraday_tax_rate: 0.00025,
            delivery_tax_rate: 0.001,
            exchange_rate: 0.0000297,
            regulatory_rate: 0.000001,
            delivery_stamp_rate: 0.00015,
            intraday_stamp_rate: 0.00003,
            settlement_charge: 15.93,
            service_tax_rate: 0.18,
            commission_override: None,
        }
    }
}

/// Charges and cash impact of a prospective fill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    pub turnover: f64,
    pub charges: ChargeBreakdown,
    pub total_charges: f64,
    /// BUY: turnover + charges. SELL: turnover - charges.
    pub net_amount: f64,
}

impl FeeSchedule {
    /// Copy of this schedule with the given flat commission (or none).
    pub fn with_commission_override(mut self, commission: Option<f64>) -> Self {
        self.commission_override = commission;
        self
    }

    /// Calculate the charges for a fill.
    ///
    /// # Example
    ///
    /// ```rust
    /// use papertrade_core::fees::FeeSchedule;
    /// use papertrade_core::types::{ProductType, Side};
    ///
    /// let quote = FeeSchedule::default().calculate(Side::Buy, 10.0, 100.0, ProductType::Delivery);
    /// assert!((quote.total_charges - 1.19).abs() < 1e-9);
    /// assert!((quote.net_amount - 1001.19).abs() < 1e-9);
    /// ```
    pub fn calculate(&self, side: Side, quantity: f64, price: f64, product: ProductType) -> FeeQuote {
        let turnover = quantity * price;

        let brokerage = match (self.commission_override, product) {
            (Some(flat), _) => flat,
            (None, ProductType::Intraday) => (turnover * self.brokerage_rate).min(self.brokerage_cap),
            (None, ProductType::Delivery) => 0.0,
        };

        let transaction_tax = match (product, side) {
            (ProductType::Intraday, Side::Sell) => turnover * self.intraday_tax_rate,
            (ProductType::Intraday, Side::Buy) => 0.0,
            (ProductType::Delivery, _) => turnover * self.delivery_tax_rate,
        };

        let stamp_duty = match (side, product) {
            (Side::Buy, ProductType::Delivery) => turnover * self.delivery_stamp_rate,
            (Side::Buy, ProductType::Intraday) => turnover * self.intraday_stamp_rate,
            (Side::Sell, _) => 0.0,
        };

        let settlement_charge = match (side, product) {
            (Side::Sell, ProductType::Delivery) => self.settlement_charge,
            _ => 0.0,
        };

        let brokerage = round2(brokerage);
        let exchange_charge = round2(turnover * self.exchange_rate);
        let regulatory_charge = round2(turnover * self.regulatory_rate);
        let service_tax =
            round2((brokerage + exchange_charge + regulatory_charge) * self.service_tax_rate);

        let charges = ChargeBreakdown {
            brokerage,
            transaction_tax: round2(transaction_tax),
            exchange_charge,
            regulatory_charge,
            stamp_duty: round2(stamp_duty),
            settlement_charge: round2(settlement_charge),
            service_tax,
        };
        let total_charges = round2(charges.total());

        let net_amount = match side {
            Side::Buy => turnover + total_charges,
            Side::Sell => turnover - total_charges,
        };

        FeeQuote {
            turnover,
            charges,
            total_charges,
            net_amount,
        }
    }
}

/// Calculate charges with the default schedule.
pub fn calculate_charges(side: Side, quantity: f64, price: f64, product: ProductType) -> FeeQuote {
    FeeSchedule::default().calculate(side, quantity, price, product)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_delivery_buy_charges() {
        let quote = calculate_charges(Side::Buy, 10.0, 100.0, ProductType::Delivery);

        assert_abs_diff_eq!(quote.turnover, 1000.0);
        assert_abs_diff_eq!(quote.charges.brokerage, 0.0);
        assert_abs_diff_eq!(quote.charges.transaction_tax, 1.0);
        assert_abs_diff_eq!(quote.charges.exchange_charge, 0.03);
        assert_abs_diff_eq!(quote.charges.regulatory_charge, 0.0);
        assert_abs_diff_eq!(quote.charges.stamp_duty, 0.15);
        assert_abs_diff_eq!(quote.charges.settlement_charge, 0.0);
        assert_abs_diff_eq!(quote.charges.service_tax, 0.01);
        assert_abs_diff_eq!(quote.total_charges, 1.19, epsilon = 1e-9);
        assert_abs_diff_eq!(quote.net_amount, 1001.19, epsilon = 1e-9);
    }

    #[test]
    fn test_delivery_sell_charges() {
        let quote = calculate_charges(Side::Sell, 10.0, 100.0, ProductType::Delivery);

        assert_abs_diff_eq!(quote.charges.transaction_tax, 1.0);
        assert_abs_diff_eq!(quote.charges.stamp_duty, 0.0);
        assert_abs_diff_eq!(quote.charges.settlement_charge, 15.93);
        assert_abs_diff_eq!(quote.total_charges, 16.97, epsilon = 1e-9);
        assert_abs_diff_eq!(quote.net_amount, 983.03, epsilon = 1e-9);
    }

    #[test]
    fn test_intraday_buy_charges() {
        let quote = calculate_charges(Side::Buy, 10.0, 1000.0, ProductType::Intraday);

        assert_abs_diff_eq!(quote.charges.brokerage, 3.0);
        assert_abs_diff_eq!(quote.charges.transaction_tax, 0.0);
        assert_abs_diff_eq!(quote.charges.exchange_charge, 0.30);
        assert_abs_diff_eq!(quote.charges.regulatory_charge, 0.01);
        assert_abs_diff_eq!(quote.charges.stamp_duty, 0.30);
        assert_abs_diff_eq!(quote.charges.service_tax, 0.60);
        assert_abs_diff_eq!(quote.total_charges, 4.21, epsilon = 1e-9);
        assert_abs_diff_eq!(quote.net_amount, 10004.21, epsilon = 1e-9);
    }

    #[test]
    fn test_intraday_sell_charges() {
        let quote = calculate_charges(Side::Sell, 10.0, 1000.0, ProductType::Intraday);

        assert_abs_diff_eq!(quote.charges.transaction_tax, 2.5);
        assert_abs_diff_eq!(quote.charges.stamp_duty, 0.0);
        assert_abs_diff_eq!(quote.charges.settlement_charge, 0.0);
        assert_abs_diff_eq!(quote.total_charges, 6.41, epsilon = 1e-9);
        assert_abs_diff_eq!(quote.net_amount, 9993.59, epsilon = 1e-9);
    }

    #[test]
    fn test_intraday_brokerage_is_capped() {
        let quote = calculate_charges(Side::Buy, 100.0, 1000.0, ProductType::Intraday);
        // 0.03% of 100000 = 30, capped at 20
        assert_abs_diff_eq!(quote.charges.brokerage, 20.0);
    }

    #[test]
    fn test_commission_override_replaces_brokerage() {
        let schedule = FeeSchedule::default().with_commission_override(Some(5.0));

        let delivery = schedule.calculate(Side::Buy, 10.0, 100.0, ProductType::Delivery);
        assert_abs_diff_eq!(delivery.charges.brokerage, 5.0);

        let intraday = schedule.calculate(Side::Buy, 100.0, 1000.0, ProductType::Intraday);
        assert_abs_diff_eq!(intraday.charges.brokerage, 5.0);
    }

    #[test]
    fn test_calculation_is_deterministic() {
        let a = calculate_charges(Side::Sell, 37.0, 412.35, ProductType::Intraday);
        let b = calculate_charges(Side::Sell, 37.0, 412.35, ProductType::Intraday);
        assert_eq!(a, b);
    }

    #[test]
    fn test_total_is_sum_of_components() {
        let quote = calculate_charges(Side::Buy, 123.0, 987.65, ProductType::Delivery);
        assert_abs_diff_eq!(quote.total_charges, quote.charges.total(), epsilon = 0.005);
    }
}
