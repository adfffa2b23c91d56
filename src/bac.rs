//! Basic Access Control (C3): MRZ-derived key agreement that stands up a
//! Secure Messaging (C4) channel over a bare ISO 7816 transport.

use crate::error::{Error, Process, Result};
use crate::iso7816::{CommandApdu, Transport};
use crate::mrz::MrzRecord;
use crate::sm::SecureMessaging;
use crate::tdes;
use rand::RngCore;
use sha1::{Digest, Sha1};

/// `derive(seed, c)`: first 16 bytes of `SHA-1(seed || c as big-endian u32)`,
/// with DES parity bits set on each 8-byte half. Used both for the static
/// `K_enc`/`K_mac` derived from the MRZ and for the session keys derived
/// from `ifdKey XOR icKey`.
fn derive(seed: &[u8], counter: u32) -> [u8; 16] {
    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(counter.to_be_bytes());
    let digest = hasher.finalize();
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[0..16]);
    tdes::set_parity_bits(&mut key);
    key
}

/// `K_seed`: first 16 bytes of `SHA-1(utf8(bac_seed_string))`.
fn key_seed(mrz: &MrzRecord) -> Result<[u8; 16]> {
    let seed_string = mrz.bac_seed_string()?;
    let digest = Sha1::digest(seed_string.as_bytes());
    let mut seed = [0u8; 16];
    seed.copy_from_slice(&digest[0..16]);
    Ok(seed)
}

fn xor16(a: &[u8; 16], b: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// Run the BAC handshake against `transport` using keys derived from `mrz`,
/// returning a session-configured [`SecureMessaging`] channel on success.
pub fn perform_bac<T: Transport>(transport: T, mrz: &MrzRecord) -> Result<SecureMessaging<T>> {
    perform_bac_with_rng(transport, mrz, &mut rand::thread_rng())
}

/// As [`perform_bac`], but with an explicit RNG for `ifdRnd`/`ifdKey` — used
/// by tests to reproduce a fixed handshake.
pub fn perform_bac_with_rng<T: Transport, R: RngCore>(
    mut transport: T,
    mrz: &MrzRecord,
    rng: &mut R,
) -> Result<SecureMessaging<T>> {
    let seed = key_seed(mrz)?;
    let k_enc = derive(&seed, 1);
    let k_mac = derive(&seed, 2);

    let get_challenge = CommandApdu::new(0x00, 0x84, 0x00, 0x00, vec![], Some(8));
    let challenge_resp = transport.transmit(&get_challenge)?;
    challenge_resp.sw.into_result(Process::Bac)?;
    if challenge_resp.data.len() != 8 {
        return Err(Error::UnexpectedEof);
    }
    let ic_rnd: [u8; 8] = challenge_resp.data.try_into().unwrap();

    let mut ifd_rnd = [0u8; 8];
    let mut ifd_key = [0u8; 16];
    rng.fill_bytes(&mut ifd_rnd);
    rng.fill_bytes(&mut ifd_key);

    let mut plaintext = Vec::with_capacity(32);
    plaintext.extend_from_slice(&ifd_rnd);
    plaintext.extend_from_slice(&ic_rnd);
    plaintext.extend_from_slice(&ifd_key);
    let e = tdes::enc_3des_cbc(&k_enc, &plaintext);
    let padded = tdes::pad_iso7816_4(&e);
    let m = tdes::retail_mac(&k_mac, &padded);

    let mut auth_data = e.clone();
    auth_data.extend_from_slice(&m);
    let external_authenticate =
        CommandApdu::new(0x00, 0x82, 0x00, 0x00, auth_data, Some(40));
    let auth_resp = transport.transmit(&external_authenticate)?;
    auth_resp.sw.into_result(Process::Bac)?;
    if auth_resp.data.len() != 40 {
        return Err(Error::UnexpectedEof);
    }

    let (response_e, response_m) = auth_resp.data.split_at(32);
    let expected_mac = tdes::retail_mac(&k_mac, &tdes::pad_iso7816_4(response_e));
    if expected_mac != response_m {
        return Err(Error::MacFailure {
            process: Process::Bac,
        });
    }

    let decrypted = tdes::dec_3des_cbc(&k_enc, response_e, Process::Bac)?;
    let ic_rnd_echo = &decrypted[0..8];
    let ifd_rnd_echo = &decrypted[8..16];
    let ic_key: [u8; 16] = decrypted[16..32].try_into().unwrap();

    if ic_rnd_echo != ic_rnd {
        return Err(Error::NonceMismatch);
    }
    if ifd_rnd_echo != ifd_rnd {
        return Err(Error::NonceMismatch);
    }

    let session_seed = xor16(&ifd_key, &ic_key);
    let k_enc_sess = derive(&session_seed, 1);
    let k_mac_sess = derive(&session_seed, 2);

    let mut ssc = [0u8; 8];
    ssc[0..4].copy_from_slice(&ic_rnd[4..8]);
    ssc[4..8].copy_from_slice(&ifd_rnd[4..8]);

    Ok(SecureMessaging::new(transport, k_enc_sess, k_mac_sess, ssc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iso7816::ResponseApdu;
    use hex_literal::hex;

    #[test]
    fn key_derivation_matches_icao_9303_11_appendix_d2() {
        let seed = hex!("239AB9CB282DAF66231DC5A4DF6BFBAE");
        let k_enc = derive(&seed, 1);
        let k_mac = derive(&seed, 2);
        assert_eq!(k_enc, hex!("AB94FDECF2674FDFB9B391F85D7F76F2"));
        assert_eq!(k_mac, hex!("7962D9ECE03D1ACD4C76089DCE131543"));
    }

    #[test]
    fn key_seed_matches_icao_example_mrz() {
        let mrz = MrzRecord {
            format: crate::mrz::MrzFormat::Td3,
            document_type: "P".into(),
            issuer: "UTO".into(),
            primary_identifier: "ERIKSSON".into(),
            secondary_identifier: Some("ANNA MARIA".into()),
            name_might_be_truncated: false,
            document_number: "L898902C".into(),
            holder_nationality: "UTO".into(),
            date_of_birth: "690806".into(),
            sex: 'F',
            date_of_expiry: "940623".into(),
            optional_data_1: String::new(),
            optional_data_2: None,
        };
        let seed = key_seed(&mrz).unwrap();
        assert_eq!(seed, hex!("239AB9CB282DAF66231DC5A4DF6BFBAE"));
    }

    struct ScriptedTransport {
        responses: Vec<ResponseApdu>,
    }

    impl Transport for ScriptedTransport {
        fn transmit(&mut self, _command: &CommandApdu) -> Result<ResponseApdu> {
            Ok(self.responses.remove(0))
        }
    }

    #[test]
    fn full_handshake_with_self_consistent_card_response() {
        // Build a fake card that answers with values derived the same way
        // a real chip would, so the full handshake can be exercised without
        // networked hardware.
        let mrz = MrzRecord {
            format: crate::mrz::MrzFormat::Td3,
            document_type: "P".into(),
            issuer: "UTO".into(),
            primary_identifier: "ERIKSSON".into(),
            secondary_identifier: Some("ANNA MARIA".into()),
            name_might_be_truncated: false,
            document_number: "L898902C".into(),
            holder_nationality: "UTO".into(),
            date_of_birth: "690806".into(),
            sex: 'F',
            date_of_expiry: "940623".into(),
            optional_data_1: String::new(),
            optional_data_2: None,
        };
        let seed = key_seed(&mrz).unwrap();
        let k_enc = derive(&seed, 1);
        let k_mac = derive(&seed, 2);

        let ic_rnd = hex!("4608F91988702212");
        let ifd_rnd = hex!("781723860C06C226");
        let ifd_key_fixed = hex!("0B795240CB7049B01C19B33E32804F0B");
        let ic_key = hex!("F1886627AA0F7A6B94F8F9BCE44C1A90");

        // Card encrypts ic_rnd || ifd_rnd || ic_key under K_enc and MACs it.
        let mut card_plain = Vec::new();
        card_plain.extend_from_slice(&ic_rnd);
        card_plain.extend_from_slice(&ifd_rnd);
        card_plain.extend_from_slice(&ic_key);
        let card_e = tdes::enc_3des_cbc(&k_enc, &card_plain);
        let card_m = tdes::retail_mac(&k_mac, &tdes::pad_iso7816_4(&card_e));
        let mut auth_response_data = card_e.clone();
        auth_response_data.extend_from_slice(&card_m);

        let responses = vec![
            ResponseApdu {
                data: ic_rnd.to_vec(),
                sw: crate::iso7816::StatusWord::OK,
            },
            ResponseApdu {
                data: auth_response_data,
                sw: crate::iso7816::StatusWord::OK,
            },
        ];
        let transport = ScriptedTransport { responses };

        struct FixedRng {
            rnd: [u8; 8],
            key: [u8; 16],
        }
        impl RngCore for FixedRng {
            fn next_u32(&mut self) -> u32 {
                unimplemented!()
            }
            fn next_u64(&mut self) -> u64 {
                unimplemented!()
            }
            fn fill_bytes(&mut self, dest: &mut [u8]) {
                if dest.len() == 8 {
                    dest.copy_from_slice(&self.rnd);
                } else {
                    dest.copy_from_slice(&self.key);
                }
            }
            fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
                self.fill_bytes(dest);
                Ok(())
            }
        }
        let mut fixed_rng = FixedRng {
            rnd: ifd_rnd,
            key: ifd_key_fixed,
        };

        let sm = perform_bac_with_rng(transport, &mrz, &mut fixed_rng).unwrap();
        let expected_seed = xor16(&ifd_key_fixed, &ic_key);
        let expected_k_enc_sess = derive(&expected_seed, 1);
        assert_eq!(sm.k_enc_for_test(), expected_k_enc_sess);
    }
}
