//! Reconciliation Service - links bank transactions to the invoices they settle.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod matching;
pub mod models;
pub mod services;
pub mod startup;
