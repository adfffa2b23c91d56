//! VEVR-01 vehicle-registration reading and verification.
//!
//! A VEVR-01 elementary file is a BER-TLV stream holding three objects:
//! the registration data itself, an X.509 certificate, and an ECDSA
//! signature over the data computed with the certificate's key. This
//! module pulls the three objects apart with [`crate::tlv`] and verifies
//! the signature; it does not reimplement any curve arithmetic — that is
//! a direct call into `p256`/`x509-cert`, exactly as the crate's scope
//! notes describe for this boundary.

use crate::error::{Error, Result};
use crate::tlv::{Block, TagClass};
use const_oid::db::rfc5912::ECDSA_WITH_SHA_256;
use der::{Decode, Encode};
use p256::ecdsa::{Signature, VerifyingKey};
use signature::Verifier;
use spki::DecodePublicKey;
use x509_cert::Certificate;

/// Tag numbers for the three top-level objects of a VEVR-01 file. The
/// source standard (a BER-TLV dump, not a published tag registry) is not
/// retained in this crate's reference material; these follow the same
/// application-class convention used for the eMRTD file structure's own
/// data-group tags (ICAO 9303-10 §4.6) — see `DESIGN.md` for the decision.
const TAG_DATA: u64 = 0x01;
const TAG_CERTIFICATE: u64 = 0x02;
const TAG_SIGNATURE: u64 = 0x03;

/// The three BER-TLV objects of one VEVR-01 elementary file, still in raw
/// byte form (the data object's internal structure is registration-scheme
/// specific and out of scope here; only its bytes matter for signing).
#[derive(Clone, Debug)]
pub struct VehicleRegistrationFile {
    pub data: Vec<u8>,
    pub certificate_der: Vec<u8>,
    pub signature: Vec<u8>,
}

impl VehicleRegistrationFile {
    /// Decode the three application-tagged objects out of a raw VEVR-01
    /// file, in any order, ignoring unrecognized siblings.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let blocks = Block::decode_all(bytes)?;

        let find = |tag: u64, name: &'static str| -> Result<Vec<u8>> {
            blocks
                .iter()
                .find(|b| b.matches(TagClass::Application, tag))
                .and_then(|b| b.raw())
                .map(|raw| raw.to_vec())
                .ok_or(Error::MissingTlvObject(name))
        };

        Ok(Self {
            data: find(TAG_DATA, "data")?,
            certificate_der: find(TAG_CERTIFICATE, "certificate")?,
            signature: find(TAG_SIGNATURE, "signature")?,
        })
    }

    /// Parse the embedded certificate and verify the signature covers
    /// `self.data` under its public key. The certificate itself is taken
    /// on trust here — chain validation against a trust anchor is an
    /// application-layer policy decision this crate does not make.
    pub fn verify(&self) -> Result<()> {
        let certificate = Certificate::from_der(&self.certificate_der)
            .map_err(|e| Error::InvalidCertificate(e.to_string()))?;
        if certificate.signature_algorithm.oid != ECDSA_WITH_SHA_256 {
            return Err(Error::InvalidCertificate(format!(
                "unsupported certificate signature algorithm {}",
                certificate.signature_algorithm.oid
            )));
        }
        let spki_der = certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::InvalidCertificate(e.to_string()))?;
        let verifying_key = VerifyingKey::from_public_key_der(&spki_der)
            .map_err(|e| Error::InvalidCertificate(e.to_string()))?;

        let signature = decode_signature(&self.signature)?;
        verifying_key
            .verify(&self.data, &signature)
            .map_err(|_| Error::SignatureVerificationFailed)
    }
}

/// Accept either a DER-encoded `ECDSA-Sig-Value` or a raw fixed-width
/// `r || s` encoding (64 bytes for P-256) — card-emitted signatures are
/// seen in both forms in the wild.
fn decode_signature(raw: &[u8]) -> Result<Signature> {
    if let Ok(sig) = Signature::from_der(raw) {
        return Ok(sig);
    }
    Signature::try_from(raw).map_err(|_| {
        Error::InvalidCertificate(
            "signature is neither valid DER nor a 64-byte raw r||s pair".to_string(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_missing_objects() {
        let block = Block::primitive(TagClass::Application, TAG_DATA, vec![1, 2, 3]);
        let bytes = block.encode();
        let err = VehicleRegistrationFile::decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::MissingTlvObject("certificate")));
    }

    #[test]
    fn decode_extracts_all_three_objects() {
        let blocks = vec![
            Block::primitive(TagClass::Application, TAG_SIGNATURE, vec![0xAA]),
            Block::primitive(TagClass::Application, TAG_DATA, vec![0x01, 0x02]),
            Block::primitive(TagClass::Application, TAG_CERTIFICATE, vec![0x99]),
        ];
        let bytes: Vec<u8> = blocks.iter().flat_map(|b| b.encode()).collect();
        let parsed = VehicleRegistrationFile::decode(&bytes).unwrap();
        assert_eq!(parsed.data, vec![0x01, 0x02]);
        assert_eq!(parsed.certificate_der, vec![0x99]);
        assert_eq!(parsed.signature, vec![0xAA]);
    }

    #[test]
    fn verify_rejects_garbage_certificate() {
        let file = VehicleRegistrationFile {
            data: vec![1, 2, 3],
            certificate_der: vec![0xDE, 0xAD, 0xBE, 0xEF],
            signature: vec![0; 64],
        };
        let err = file.verify().unwrap_err();
        assert!(matches!(err, Error::InvalidCertificate(_)));
    }

    #[test]
    fn decode_signature_accepts_der_and_raw_forms() {
        use p256::ecdsa::SigningKey;
        use rand::rngs::OsRng;
        use signature::Signer;

        let signing_key = SigningKey::random(&mut OsRng);
        let sig: Signature = signing_key.sign(b"message");

        let der_bytes = sig.to_der();
        let from_der = decode_signature(der_bytes.as_bytes()).unwrap();
        assert_eq!(from_der, sig);

        let raw_bytes = sig.to_bytes();
        let from_raw = decode_signature(&raw_bytes).unwrap();
        assert_eq!(from_raw, sig);
    }

    #[test]
    fn decode_signature_rejects_malformed_bytes() {
        let err = decode_signature(&[0u8; 3]).unwrap_err();
        assert!(matches!(err, Error::InvalidCertificate(_)));
    }
}
