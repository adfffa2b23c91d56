//! Secure Messaging (C4): the stateful APDU wrapper/unwrapper built on top
//! of a bare ISO 7816 [`Transport`] once BAC (C3) has produced session
//! keys. `SecureMessaging<T>` itself implements `Transport`, so callers
//! compose it exactly like the bare channel it replaces.

use crate::error::{Error, Process, Result};
use crate::iso7816::{CommandApdu, ResponseApdu, StatusWord, Transport};
use crate::tdes;
use crate::tlv::{Block, TagClass};
use zeroize::Zeroize;

const TAG_ENCRYPTED_DATA: u64 = 0x07;
const TAG_EXPECTED_LENGTH: u64 = 0x17;
const TAG_MAC: u64 = 0x0E;
const TAG_STATUS: u64 = 0x19;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ChannelState {
    Fresh,
    Live,
}

/// Big-endian increment with wraparound, used for the Send Sequence
/// Counter on every message half (outbound wrap and inbound unwrap).
fn increment_be(buf: &mut [u8; 8]) {
    for byte in buf.iter_mut().rev() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
}

/// A BAC-established encrypted, integrity-protected channel wrapping a bare
/// transport. Keys and the send-sequence counter are exclusively owned by
/// this value for the lifetime of the session; on `MacFailure` or
/// `CipherFormat` the channel is poisoned and every subsequent `transmit`
/// fails without touching the underlying transport.
pub struct SecureMessaging<T: Transport> {
    transport: T,
    k_enc: [u8; 16],
    k_mac: [u8; 16],
    ssc: [u8; 8],
    state: ChannelState,
    poisoned: bool,
}

impl<T: Transport> SecureMessaging<T> {
    pub fn new(transport: T, k_enc: [u8; 16], k_mac: [u8; 16], ssc: [u8; 8]) -> Self {
        Self {
            transport,
            k_enc,
            k_mac,
            ssc,
            state: ChannelState::Fresh,
            poisoned: false,
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn is_live(&self) -> bool {
        self.state == ChannelState::Live
    }

    #[cfg(test)]
    pub(crate) fn k_enc_for_test(&self) -> [u8; 16] {
        self.k_enc
    }

    fn wrap(&mut self, command: &CommandApdu) -> Result<CommandApdu> {
        let mut blocks = Vec::new();

        if !command.data.is_empty() {
            let padded = tdes::pad_iso7816_4(&command.data);
            let encrypted = tdes::enc_3des_cbc(&self.k_enc, &padded);
            let mut value = Vec::with_capacity(1 + encrypted.len());
            value.push(0x01);
            value.extend_from_slice(&encrypted);
            blocks.push(Block::primitive(TagClass::ContextSpecific, TAG_ENCRYPTED_DATA, value));
        }

        let case = command.case();
        if let Some(le) = command.le {
            let value = if case.is_extended() {
                le.to_be_bytes().to_vec()
            } else {
                vec![le as u8]
            };
            blocks.push(Block::primitive(
                TagClass::ContextSpecific,
                TAG_EXPECTED_LENGTH,
                value,
            ));
        }

        let mac_header = [
            0x0C,
            command.ins,
            command.p1,
            command.p2,
            0x80,
            0x00,
            0x00,
            0x00,
        ];

        increment_be(&mut self.ssc);

        let body: Vec<u8> = blocks.iter().flat_map(|b| b.encode()).collect();
        let mut m_in = Vec::with_capacity(8 + 8 + body.len());
        m_in.extend_from_slice(&self.ssc);
        m_in.extend_from_slice(&mac_header);
        m_in.extend_from_slice(&body);
        let m_in = tdes::pad_iso7816_4(&m_in);
        let mac = tdes::retail_mac(&self.k_mac, &m_in);
        blocks.push(Block::primitive(TagClass::ContextSpecific, TAG_MAC, mac.to_vec()));

        let full_body: Vec<u8> = blocks.iter().flat_map(|b| b.encode()).collect();
        Ok(CommandApdu::new(
            0x0C,
            command.ins,
            command.p1,
            command.p2,
            full_body,
            Some(0),
        ))
    }

    fn unwrap(&mut self, response: ResponseApdu) -> Result<ResponseApdu> {
        if response.data.is_empty() {
            return Ok(response);
        }

        let blocks = Block::decode_all(&response.data)?;

        increment_be(&mut self.ssc);

        let mac_block = blocks.iter().find(|b| b.matches(TagClass::ContextSpecific, TAG_MAC));
        let non_mac: Vec<u8> = blocks
            .iter()
            .filter(|b| !b.matches(TagClass::ContextSpecific, TAG_MAC))
            .flat_map(|b| b.encode())
            .collect();
        let mut m_in = Vec::with_capacity(8 + non_mac.len());
        m_in.extend_from_slice(&self.ssc);
        m_in.extend_from_slice(&non_mac);
        let m_in = tdes::pad_iso7816_4(&m_in);
        let expected_mac = tdes::retail_mac(&self.k_mac, &m_in);

        match mac_block {
            Some(block) => {
                if block.raw() != Some(&expected_mac[..]) {
                    self.poisoned = true;
                    return Err(Error::MacFailure {
                        process: Process::SecureMessaging,
                    });
                }
            }
            None => {
                tracing::warn!("secure messaging response carried no MAC block; skipping verification");
            }
        }

        let sw = blocks
            .iter()
            .find(|b| b.matches(TagClass::ContextSpecific, TAG_STATUS))
            .and_then(|b| b.raw())
            .filter(|raw| raw.len() == 2)
            .map(|raw| StatusWord(u16::from_be_bytes([raw[0], raw[1]])))
            .unwrap_or(response.sw);

        let data = match blocks
            .iter()
            .find(|b| b.matches(TagClass::ContextSpecific, TAG_ENCRYPTED_DATA))
        {
            Some(block) => {
                let raw = block.raw().ok_or(Error::UnexpectedEof)?;
                let (indicator, ciphertext) = raw.split_first().ok_or(Error::UnexpectedEof)?;
                if *indicator != 0x01 {
                    self.poisoned = true;
                    return Err(Error::CipherFormat {
                        process: Process::SecureMessaging,
                        detail: format!("expected padding indicator 0x01, found {indicator:#04X}"),
                    });
                }
                let decrypted =
                    match tdes::dec_3des_cbc(&self.k_enc, ciphertext, Process::SecureMessaging) {
                        Ok(plain) => plain,
                        Err(err) => {
                            self.poisoned = true;
                            return Err(err);
                        }
                    };
                match tdes::unpad_iso7816_4(&decrypted, Process::SecureMessaging) {
                    Ok(data) => data,
                    Err(err) => {
                        self.poisoned = true;
                        return Err(err);
                    }
                }
            }
            None => Vec::new(),
        };

        Ok(ResponseApdu { data, sw })
    }
}

impl<T: Transport> Transport for SecureMessaging<T> {
    fn transmit(&mut self, command: &CommandApdu) -> Result<ResponseApdu> {
        if self.poisoned {
            return Err(Error::ChannelPoisoned);
        }
        if command.cla != 0x00 {
            return Err(Error::InvalidClass(command.cla));
        }

        tracing::debug!(ssc = ?self.ssc, ins = command.ins, "secure messaging: wrapping command");
        let wrapped = self.wrap(command)?;
        let raw_response = self.transport.transmit(&wrapped)?;
        let result = self.unwrap(raw_response);
        if result.is_ok() {
            self.state = ChannelState::Live;
        }
        tracing::debug!(ssc = ?self.ssc, ok = result.is_ok(), "secure messaging: unwrapped response");
        result
    }
}

impl<T: Transport> Drop for SecureMessaging<T> {
    fn drop(&mut self) {
        self.k_enc.zeroize();
        self.k_mac.zeroize();
    }
}
