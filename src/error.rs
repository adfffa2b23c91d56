//! Error taxonomy shared by the BER-TLV codec, the MRZ parser, BAC, and the
//! Secure Messaging channel.
//!
//! The core never retries or recovers locally; every variant here is meant
//! to be propagated to the caller (and, at the application layer, wrapped in
//! `anyhow::Context` the way `main.rs` wraps `Icao9303` calls).

use thiserror::Error;

/// A field that overflowed its representable range while decoding BER-TLV.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OverflowField {
    TagNumber,
    Length,
}

impl std::fmt::Display for OverflowField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TagNumber => write!(f, "tag number"),
            Self::Length => write!(f, "length"),
        }
    }
}

/// A BER-TLV feature this codec deliberately does not implement.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Unsupported {
    IndefiniteLength,
}

impl std::fmt::Display for Unsupported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndefiniteLength => write!(f, "indefinite-length encoding"),
        }
    }
}

/// Which check digit a `BadCheckDigit` failure refers to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CheckDigitField {
    DocumentNumber,
    DateOfBirth,
    DateOfExpiry,
    OptionalData1,
    Composite,
}

impl std::fmt::Display for CheckDigitField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DocumentNumber => write!(f, "document number"),
            Self::DateOfBirth => write!(f, "date of birth"),
            Self::DateOfExpiry => write!(f, "date of expiry"),
            Self::OptionalData1 => write!(f, "optional data 1"),
            Self::Composite => write!(f, "composite"),
        }
    }
}

/// Which process a communication or MAC failure occurred in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Process {
    Bac,
    SecureMessaging,
    /// A plain (pre-BAC or unprotected) ISO 7816 file-selection/read call
    /// made through [`crate::icao9303::Icao9303`], not one of the other two.
    Application,
}

impl std::fmt::Display for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bac => write!(f, "BAC"),
            Self::SecureMessaging => write!(f, "secure messaging"),
            Self::Application => write!(f, "application"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of stream")]
    UnexpectedEof,

    #[error("unsupported: {0}")]
    Unsupported(Unsupported),

    #[error("{0} overflowed")]
    Overflow(OverflowField),

    #[error("MRZ does not match TD1, TD2, or TD3 shape")]
    UnknownFormat,

    #[error("bad {which} check digit: read {read}, computed {computed}")]
    BadCheckDigit {
        which: CheckDigitField,
        read: u8,
        computed: u8,
    },

    #[error("character {c:?} is not in the check-digit alphabet")]
    UnknownCharacter { c: char },

    #[error("{process} failed: card returned status {sw:04X}")]
    CommunicationError { process: Process, sw: u16 },

    #[error("{process} MAC verification failed")]
    MacFailure { process: Process },

    #[error("card did not echo IFD challenge")]
    NonceMismatch,

    #[error("secure messaging cipher format error ({detail}): {process}")]
    CipherFormat { process: Process, detail: String },

    #[error("secure messaging channel is poisoned and cannot be reused")]
    ChannelPoisoned,

    #[error("command APDU CLA must be 0x00, got {0:#04X}")]
    InvalidClass(u8),

    #[error("vehicle registration file is missing its {0} BER-TLV object")]
    MissingTlvObject(&'static str),

    #[error("vehicle registration certificate could not be parsed: {0}")]
    InvalidCertificate(String),

    #[error("vehicle registration signature verification failed")]
    SignatureVerificationFailed,
}

pub type Result<T> = std::result::Result<T, Error>;
