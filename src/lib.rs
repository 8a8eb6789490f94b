//! Fiat (RUB) / Bitcoin exchange desk.
//!
//! Orders are quoted from a BTC rate, paid through an external payment
//! processor and confirmed by operators. Processor callbacks arrive on an
//! HTTP webhook; every status change goes through the order store.

pub mod config;
pub mod domain;
pub mod lifecycle;
pub mod notification;
pub mod processor;
pub mod rates;
pub mod service;
pub mod settings;
pub mod storage;
pub mod webhook;
