//! Client-side core for two smart-card interactions: ICAO 9303 eMRTD
//! reading (MRZ parsing, Basic Access Control, Secure Messaging) and
//! VEVR-01 vehicle-registration reading/verification.
//!
//! Four tightly-coupled subsystems do the work:
//!
//! - [`tlv`] — the BER-TLV codec (C1), used by the Secure Messaging
//!   framing and the vehicle-registration file format alike.
//! - [`mrz`] — the MRZ parser and check-digit engine (C2).
//! - [`bac`] — Basic Access Control (C3): the MRZ-derived handshake that
//!   stands up a session.
//! - [`sm`] — the Secure Messaging channel (C4) that wraps/unwraps every
//!   APDU for the lifetime of that session.
//!
//! [`icao9303`] and [`vreg`] are the thin application layer built on top
//! of those four cores; [`iso7816`] and [`error`] are shared plumbing.

pub mod bac;
pub mod error;
pub mod icao9303;
pub mod iso7816;
pub mod mrz;
pub mod sm;
pub mod tdes;
pub mod tlv;
pub mod vreg;

pub use error::{Error, Result};
