//! ISO 7816-4 APDU framing: status words, command/response APDUs, the four
//! APDU cases, and the `Transport` trait an `Icao9303` session talks to.
//!
//! The source this crate grew from talked to a Proxmark3 over a concrete
//! NFC reader type. That reader is out of scope here (see the crate's
//! design notes on the PC/SC boundary), so `Transport` stands in its place:
//! anything that can shuttle a command APDU to a chip and hand back a
//! response implements it, whether that is a real reader or a recorded
//! trace played back for testing.

use crate::error::{Error, Process, Result};

/// A two-byte ISO 7816-4 status word.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct StatusWord(pub u16);

impl StatusWord {
    pub const OK: StatusWord = StatusWord(0x9000);
    pub const END_OF_FILE: StatusWord = StatusWord(0x6B00);
    pub const FILE_NOT_FOUND: StatusWord = StatusWord(0x6A82);

    pub fn is_success(self) -> bool {
        self == Self::OK
    }

    pub fn sw1(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn sw2(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// `61XX`: the call succeeded but `XX` more bytes of response data are
    /// available via `GET RESPONSE` (ISO 7816-4 §7.1.3). Callers that treat
    /// a bare SELECT as successful whenever data remains, not only on exact
    /// `9000`, check this rather than re-deriving it from `sw1`/`sw2`.
    pub fn data_remaining(self) -> Option<u8> {
        if self.sw1() == 0x61 {
            Some(self.sw2())
        } else {
            None
        }
    }

    /// Turn a non-success status word into a `CommunicationError`.
    pub fn into_result(self, process: Process) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(Error::CommunicationError {
                process,
                sw: self.0,
            })
        }
    }
}

impl std::fmt::Display for StatusWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Which of the four ISO 7816-4 APDU cases a command belongs to, driven by
/// whether it carries command data and/or expects response data.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Case {
    Case1,
    Case2Short,
    Case2Extended,
    Case3Short,
    Case3Extended,
    Case4Short,
    Case4Extended,
}

impl Case {
    pub fn is_sending_data(self) -> bool {
        matches!(
            self,
            Case::Case3Short | Case::Case3Extended | Case::Case4Short | Case::Case4Extended
        )
    }

    pub fn is_receiving_data(self) -> bool {
        matches!(
            self,
            Case::Case2Short | Case::Case2Extended | Case::Case4Short | Case::Case4Extended
        )
    }

    pub fn is_extended(self) -> bool {
        matches!(self, Case::Case2Extended | Case::Case3Extended | Case::Case4Extended)
    }
}

/// An ISO 7816-4 command APDU. `le` of `None` means "no Le field" (Case 1
/// or Case 3); `Some(0)` in the short form requests the maximum 256 bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandApdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    pub le: Option<u16>,
}

impl CommandApdu {
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>, le: Option<u16>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le,
        }
    }

    pub fn case(&self) -> Case {
        let extended = self.data.len() > 255 || matches!(self.le, Some(le) if le > 256);
        match (self.data.is_empty(), self.le) {
            (true, None) => Case::Case1,
            (true, Some(_)) => {
                if extended {
                    Case::Case2Extended
                } else {
                    Case::Case2Short
                }
            }
            (false, None) => {
                if extended {
                    Case::Case3Extended
                } else {
                    Case::Case3Short
                }
            }
            (false, Some(_)) => {
                if extended {
                    Case::Case4Extended
                } else {
                    Case::Case4Short
                }
            }
        }
    }

    /// Serialize to wire bytes, short form only (extended-length APDUs are
    /// out of scope: every command this crate issues fits in short form).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.cla, self.ins, self.p1, self.p2];
        if !self.data.is_empty() {
            out.push(self.data.len() as u8);
            out.extend_from_slice(&self.data);
        }
        if let Some(le) = self.le {
            out.push(le as u8);
        }
        out
    }
}

/// An ISO 7816-4 response APDU: response data plus the trailing status
/// word.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResponseApdu {
    pub data: Vec<u8>,
    pub sw: StatusWord,
}

impl ResponseApdu {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::UnexpectedEof);
        }
        let (data, sw) = bytes.split_at(bytes.len() - 2);
        Ok(Self {
            data: data.to_vec(),
            sw: StatusWord(u16::from_be_bytes([sw[0], sw[1]])),
        })
    }
}

/// Anything able to carry a command APDU to a chip and return the response.
/// Implementations may talk to a real PC/SC reader, a Proxmark3, or replay
/// a recorded trace; the core only ever calls through this trait.
pub trait Transport {
    fn transmit(&mut self, command: &CommandApdu) -> Result<ResponseApdu>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_all_four_cases() {
        assert_eq!(CommandApdu::new(0, 0xA4, 4, 0, vec![], None).case(), Case::Case1);
        assert_eq!(
            CommandApdu::new(0, 0xB0, 0, 0, vec![], Some(0)).case(),
            Case::Case2Short
        );
        assert_eq!(
            CommandApdu::new(0, 0xA4, 4, 0, vec![1, 2, 3], None).case(),
            Case::Case3Short
        );
        assert_eq!(
            CommandApdu::new(0, 0x84, 0, 0, vec![1, 2, 3], Some(8)).case(),
            Case::Case4Short
        );
    }

    #[test]
    fn data_sending_and_receiving_predicates() {
        assert!(!Case::Case1.is_sending_data());
        assert!(!Case::Case1.is_receiving_data());
        assert!(Case::Case4Short.is_sending_data());
        assert!(Case::Case4Short.is_receiving_data());
        assert!(Case::Case3Short.is_sending_data());
        assert!(!Case::Case3Short.is_receiving_data());
    }

    #[test]
    fn command_apdu_roundtrip_bytes() {
        let cmd = CommandApdu::new(0x00, 0xA4, 0x02, 0x0C, vec![0x01, 0x1E], None);
        assert_eq!(cmd.to_bytes(), vec![0x00, 0xA4, 0x02, 0x0C, 0x02, 0x01, 0x1E]);
    }

    #[test]
    fn response_apdu_splits_trailer() {
        let resp = ResponseApdu::from_bytes(&[0xDE, 0xAD, 0x90, 0x00]).unwrap();
        assert_eq!(resp.data, vec![0xDE, 0xAD]);
        assert_eq!(resp.sw, StatusWord::OK);
        assert!(resp.sw.is_success());
    }

    #[test]
    fn data_remaining_reads_sw2_of_61xx() {
        assert_eq!(StatusWord(0x61A3).data_remaining(), Some(0xA3));
        assert_eq!(StatusWord::OK.data_remaining(), None);
    }

    #[test]
    fn non_success_status_becomes_error() {
        let resp = ResponseApdu::from_bytes(&[0x6A, 0x82]).unwrap();
        let err = resp.sw.into_result(Process::Bac).unwrap_err();
        assert!(matches!(err, Error::CommunicationError { sw: 0x6A82, .. }));
    }
}
