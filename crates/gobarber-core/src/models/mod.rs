//! Data models for GoBarber API responses and persisted records.
//!
//! This module contains the structures used throughout the client:
//! - `User`, `SignInCredentials`, `ProfileUpdate`: account data
//! - `TokenRecord`: an access token with its creation time
//! - `Provider`, `HourAvailability`: barbers and their open slots
//! - `Appointment`, `NewAppointment`: bookings

pub mod appointment;
pub mod provider;
pub mod token;
pub mod user;

pub use appointment::{Appointment, NewAppointment};
pub use provider::{split_by_period, DayPeriods, HourAvailability, Provider};
pub use token::{RefreshResponse, SignInResponse, TokenRecord};
pub use user::{ProfileUpdate, SignInCredentials, User};
