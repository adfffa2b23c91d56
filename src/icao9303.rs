//! `Icao9303`: a thin wrapper turning a bare [`Transport`] into the small
//! set of ISO 7816-4 file-selection/read calls both eMRTD and VEVR-01
//! reading need. It implements `Transport` itself, so it composes with
//! [`crate::bac::perform_bac`] and [`crate::sm::SecureMessaging`] exactly
//! like the bare channel it wraps: select files before BAC over a plain
//! `Icao9303<R>`, then rewrap the post-BAC `SecureMessaging<R>` in a fresh
//! `Icao9303` to select and read the protected elementary files.

use crate::error::{Error, Process, Result};
use crate::iso7816::{CommandApdu, ResponseApdu, Transport};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Well-known file identifiers referenced by the eMRTD file structure
/// (ICAO 9303-10 figure 3) and by ISO 7816-4 itself. `TryFromPrimitive`
/// lets a CLI or log line recover the symbolic name from a raw file
/// identifier; `IntoPrimitive` is the inverse, for passing a constant
/// straight to [`Icao9303::select_elementary_file`].
#[repr(u16)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
pub enum FileId {
    MasterFile = 0x3F00,
    Directory = 0x2F00,
    Attributes = 0x2F01,
    /// Presence of this file (readable by short-EF before BAC) signals
    /// PACE support; this crate does not implement PACE (see crate docs).
    CardAccess = 0x011C,
    CardSecurity = 0x011D,
    Com = 0x0101,
}

pub struct Icao9303<T: Transport> {
    transport: T,
}

impl<T: Transport> Icao9303<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Unwrap back to the underlying transport, e.g. to hand it to
    /// [`crate::bac::perform_bac`].
    pub fn into_inner(self) -> T {
        self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Select the master file (ISO 7816-4 §11.2.2).
    pub fn select_master_file(&mut self) -> Result<()> {
        self.select(&[0x3F, 0x00], 0x00)
    }

    /// Select a dedicated file (application) by AID.
    pub fn select_dedicated_file(&mut self, application_id: &[u8]) -> Result<()> {
        if application_id.len() > 16 {
            return Err(Error::CommunicationError {
                process: Process::Application,
                sw: 0x6A86, // "incorrect parameters P1-P2" — AID too long for this command form
            });
        }
        self.select(application_id, 0x04)
    }

    /// Select an elementary file by file identifier. The dedicated file it
    /// lives in must already be selected (ICAO 9303-10 §3.6.2).
    pub fn select_elementary_file(&mut self, file: u16) -> Result<()> {
        self.select(&file.to_be_bytes(), 0x02)
    }

    fn select(&mut self, data: &[u8], p1: u8) -> Result<()> {
        let command = CommandApdu::new(0x00, 0xA4, p1, 0x0C, data.to_vec(), None);
        let response = self.transport.transmit(&command)?;
        if !response.sw.is_success() && response.sw.data_remaining().is_none() {
            return Err(Error::CommunicationError {
                process: Process::Application,
                sw: response.sw.0,
            });
        }
        Ok(())
    }

    /// Read binary data from an elementary file using a short EF identifier
    /// (ICAO 9303-10 §3.6.3.2, ISO 7816-4 §11.3.3). Preferred over
    /// [`Self::read_elementary_file`] when the file fits a short EF id
    /// (`file <= 0x1F`) and no prior SELECT is required.
    pub fn read_binary_short_ef(&mut self, file: u8) -> Result<Vec<u8>> {
        if file > 0x1F {
            return Err(Error::CommunicationError {
                process: Process::Application,
                sw: 0x6A86,
            });
        }
        // b8 of P2 set means "short file id used"; Le=0x0000 requests "read all".
        let command = CommandApdu::new(0x00, 0xB0, 0x80 | file, 0x00, vec![], Some(0));
        let response = self.transport.transmit(&command)?;
        if !response.sw.is_success() {
            return Err(Error::CommunicationError {
                process: Process::Application,
                sw: response.sw.0,
            });
        }
        Ok(response.data)
    }

    /// Select then read an elementary file by full file identifier.
    pub fn read_elementary_file(&mut self, file: u16) -> Result<Vec<u8>> {
        self.select_elementary_file(file)?;
        let command = CommandApdu::new(0x00, 0xB0, 0x00, 0x00, vec![], Some(0));
        let response = self.transport.transmit(&command)?;
        if !response.sw.is_success() {
            return Err(Error::CommunicationError {
                process: Process::Application,
                sw: response.sw.0,
            });
        }
        Ok(response.data)
    }

    /// `GET CHALLENGE` (ICAO 9303-11 §4.3.4.1): ask the card for the 8-byte
    /// nonce BAC authenticates against. Exposed for callers that want to
    /// drive the handshake by hand; [`crate::bac::perform_bac`] talks
    /// directly to a bare `Transport` and does not call through here.
    pub fn get_challenge(&mut self) -> Result<[u8; 8]> {
        let command = CommandApdu::new(0x00, 0x84, 0x00, 0x00, vec![], Some(8));
        let response = self.transport.transmit(&command)?;
        response.sw.into_result(Process::Bac)?;
        response
            .data
            .try_into()
            .map_err(|_| Error::UnexpectedEof)
    }

    /// `EXTERNAL AUTHENTICATE` (ICAO 9303-11 §4.3.4.1) with a pre-built
    /// 40-byte `E || M` payload.
    pub fn external_authenticate(&mut self, data: &[u8; 0x28]) -> Result<Vec<u8>> {
        let command = CommandApdu::new(0x00, 0x82, 0x00, 0x00, data.to_vec(), Some(40));
        let response = self.transport.transmit(&command)?;
        response.sw.into_result(Process::Bac)?;
        Ok(response.data)
    }

    /// Send a raw command APDU, bypassing every convenience above.
    pub fn send_apdu(&mut self, command: &CommandApdu) -> Result<ResponseApdu> {
        self.transport.transmit(command)
    }
}

impl<T: Transport> Transport for Icao9303<T> {
    fn transmit(&mut self, command: &CommandApdu) -> Result<ResponseApdu> {
        self.transport.transmit(command)
    }
}
