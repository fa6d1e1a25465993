//! ESP32-S3 specific parts of the SSPOT soil logger
//!
//! Everything here touches hardware or the radio: the RS-485 link to the
//! probe, Wi-Fi, the embassy-net based HTTPS and SNTP clients, and the clock
//! backed by the embassy time driver.

#![no_std]

extern crate alloc;

pub mod clock;
pub mod config;
pub mod net;
pub mod rs485;
pub mod wifi;
