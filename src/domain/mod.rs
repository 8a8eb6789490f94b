//! Domain models for the exchange desk.

mod fees;
mod flow;
mod order;
mod settings;
mod user;

pub use fees::{Fees, compute_fees};
pub use flow::{
    ExchangeFlow, FlowStep, Quote, ValidationError, parse_amount_input, validate_btc_address,
    validate_destination, validate_fiat_requisite,
};
pub use order::{Direction, NewOrder, Order, OrderStatus, OrderUpdate, PaymentType};
pub use settings::{SettingValue, keys};
pub use user::{NewUser, Statistics, User};
