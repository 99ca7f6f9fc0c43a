//! Order parameters and their validation
//!
//! Orders are validated before any counter is touched or anything is signed,
//! so a rejected order leaves the account unchanged. The only coercion is a
//! market order without a price, which is sent with price zero.

use alloy_primitives::{Address, U256};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::payload::{OrderContext, StopOrderContext};

/// Maximum token symbol length in bytes
pub const MAX_TOKEN_LEN: usize = 20;

/// Largest accepted price, 10^29 - 1
pub static MAX_PRICE: Lazy<U256> =
    Lazy::new(|| U256::from(10u64).pow(U256::from(29u64)) - U256::from(1u64));

/// Largest accepted quantity, 10^41 - 1
pub static MAX_QUANTITY: Lazy<U256> =
    Lazy::new(|| U256::from(10u64).pow(U256::from(41u64)) - U256::from(1u64));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

impl From<Side> for u8 {
    fn from(side: Side) -> u8 {
        side as u8
    }
}

impl TryFrom<u8> for Side {
    type Error = OrderValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Side::Buy),
            1 => Ok(Side::Sell),
            other => Err(OrderValidationError::InvalidSide(other)),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OrderType {
    Limit = 0,
    Market = 1,
}

impl From<OrderType> for u8 {
    fn from(order_type: OrderType) -> u8 {
        order_type as u8
    }
}

impl TryFrom<u8> for OrderType {
    type Error = OrderValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OrderType::Limit),
            1 => Ok(OrderType::Market),
            other => Err(OrderValidationError::InvalidOrderType(other)),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderValidationError {
    #[error("Order owner is the zero address")]
    ZeroOwner,

    #[error("Token field {field} is empty")]
    EmptyToken { field: &'static str },

    #[error("Token field {field} is {len} bytes, limit is 20")]
    TokenTooLong { field: &'static str, len: usize },

    #[error("Invalid side {0}")]
    InvalidSide(u8),

    #[error("Invalid order type {0}")]
    InvalidOrderType(u8),

    #[error("Limit order requires a positive price")]
    MissingLimitPrice,

    #[error("Market orders cannot carry take-profit/stop-loss")]
    MarketOrderWithTpsl,

    #[error("Quantity must be positive")]
    ZeroQuantity,

    #[error("Price {price} exceeds maximum")]
    PriceTooLarge { price: U256 },

    #[error("Quantity {quantity} exceeds maximum")]
    QuantityTooLarge { quantity: U256 },

    #[error("TPSL field {field} out of range: {value}")]
    TpslOutOfRange { field: &'static str, value: U256 },

    #[error("{side} take-profit {tp_limit} is on the wrong side of price {price}")]
    TakeProfitOrdering {
        side: Side,
        tp_limit: U256,
        price: U256,
    },

    #[error("{side} stop-loss trigger {sl_trigger} is on the wrong side of price {price}")]
    StopLossOrdering {
        side: Side,
        sl_trigger: U256,
        price: U256,
    },

    #[error("Stop price out of range: {stop_price}")]
    StopPriceOutOfRange { stop_price: U256 },
}

/// Take-profit / stop-loss attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TpslParams {
    pub tp_limit: U256,
    pub sl_trigger: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sl_limit: Option<U256>,
}

impl TpslParams {
    pub fn new(tp_limit: U256, sl_trigger: U256) -> Self {
        Self {
            tp_limit,
            sl_trigger,
            sl_limit: None,
        }
    }

    pub fn with_sl_limit(mut self, sl_limit: U256) -> Self {
        self.sl_limit = Some(sl_limit);
        self
    }

    fn validate(&self, side: Side, price: U256) -> Result<(), OrderValidationError> {
        for (field, value) in [("tpLimit", self.tp_limit), ("slTrigger", self.sl_trigger)] {
            if value.is_zero() || value > *MAX_PRICE {
                return Err(OrderValidationError::TpslOutOfRange { field, value });
            }
        }
        if let Some(sl_limit) = self.sl_limit {
            if sl_limit > *MAX_PRICE {
                return Err(OrderValidationError::TpslOutOfRange {
                    field: "slLimit",
                    value: sl_limit,
                });
            }
        }

        let (tp_ok, sl_ok) = match side {
            Side::Buy => (self.tp_limit > price, self.sl_trigger < price),
            Side::Sell => (self.tp_limit < price, self.sl_trigger > price),
        };
        if !tp_ok {
            return Err(OrderValidationError::TakeProfitOrdering {
                side,
                tp_limit: self.tp_limit,
                price,
            });
        }
        if !sl_ok {
            return Err(OrderValidationError::StopLossOrdering {
                side,
                sl_trigger: self.sl_trigger,
                price,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderParams {
    pub base_token: String,
    pub quote_token: String,
    pub side: Side,
    /// Required for limit orders; `None` on a market order means zero
    pub price: Option<U256>,
    pub quantity: U256,
    pub order_type: OrderType,
}

impl OrderParams {
    pub fn limit(
        base_token: impl Into<String>,
        quote_token: impl Into<String>,
        side: Side,
        price: U256,
        quantity: U256,
    ) -> Self {
        Self {
            base_token: base_token.into(),
            quote_token: quote_token.into(),
            side,
            price: Some(price),
            quantity,
            order_type: OrderType::Limit,
        }
    }

    pub fn market(
        base_token: impl Into<String>,
        quote_token: impl Into<String>,
        side: Side,
        quantity: U256,
    ) -> Self {
        Self {
            base_token: base_token.into(),
            quote_token: quote_token.into(),
            side,
            price: None,
            quantity,
            order_type: OrderType::Market,
        }
    }

    /// Validate a plain order and produce its wire context
    pub fn validate(&self, owner: Address) -> Result<OrderContext, OrderValidationError> {
        self.validate_inner(owner, None)
    }

    /// Validate an order carrying take-profit/stop-loss
    pub fn validate_with_tpsl(
        &self,
        owner: Address,
        tpsl: &TpslParams,
    ) -> Result<OrderContext, OrderValidationError> {
        self.validate_inner(owner, Some(tpsl))
    }

    fn validate_inner(
        &self,
        owner: Address,
        tpsl: Option<&TpslParams>,
    ) -> Result<OrderContext, OrderValidationError> {
        if owner.is_zero() {
            return Err(OrderValidationError::ZeroOwner);
        }
        check_token("baseToken", &self.base_token)?;
        check_token("quoteToken", &self.quote_token)?;

        let price = match (self.order_type, self.price) {
            (OrderType::Limit, Some(price)) if !price.is_zero() => price,
            (OrderType::Limit, _) => return Err(OrderValidationError::MissingLimitPrice),
            (OrderType::Market, price) => price.unwrap_or(U256::ZERO),
        };
        if self.order_type == OrderType::Market && tpsl.is_some() {
            return Err(OrderValidationError::MarketOrderWithTpsl);
        }
        if self.quantity.is_zero() {
            return Err(OrderValidationError::ZeroQuantity);
        }
        if price > *MAX_PRICE {
            return Err(OrderValidationError::PriceTooLarge { price });
        }
        if self.quantity > *MAX_QUANTITY {
            return Err(OrderValidationError::QuantityTooLarge {
                quantity: self.quantity,
            });
        }
        if let Some(tpsl) = tpsl {
            tpsl.validate(self.side, price)?;
        }

        Ok(OrderContext {
            owner,
            base_token: self.base_token.clone(),
            quote_token: self.quote_token.clone(),
            side: self.side,
            price,
            quantity: self.quantity,
            order_type: self.order_type,
            tpsl: tpsl.cloned(),
        })
    }
}

/// An order that activates once the market reaches `stop_price`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOrderParams {
    pub order: OrderParams,
    pub stop_price: U256,
}

impl StopOrderParams {
    pub fn new(order: OrderParams, stop_price: U256) -> Self {
        Self { order, stop_price }
    }

    pub fn validate(&self, owner: Address) -> Result<StopOrderContext, OrderValidationError> {
        if self.stop_price.is_zero() || self.stop_price > *MAX_PRICE {
            return Err(OrderValidationError::StopPriceOutOfRange {
                stop_price: self.stop_price,
            });
        }
        let order = self.order.validate(owner)?;
        Ok(StopOrderContext {
            order,
            stop_price: self.stop_price,
        })
    }
}

fn check_token(field: &'static str, token: &str) -> Result<(), OrderValidationError> {
    if token.is_empty() {
        return Err(OrderValidationError::EmptyToken { field });
    }
    if token.len() > MAX_TOKEN_LEN {
        return Err(OrderValidationError::TokenTooLong {
            field,
            len: token.len(),
        });
    }
    Ok(())
}
