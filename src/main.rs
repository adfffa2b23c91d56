//! CLI front-end: drives the core library against recorded APDU traces
//! and `.bin` dumps rather than a live PC/SC reader (out of this crate's
//! scope — see the crate docs). Two subcommands mirror the two card
//! interactions the library implements: `read-mrtd` runs BAC and Secure
//! Messaging against a recorded eMRTD session; `read-vehicle-registration`
//! decodes and verifies VEVR-01 `.bin` dumps.

use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use argh::FromArgs;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use icao9303::error::Error;
use icao9303::icao9303::Icao9303;
use icao9303::iso7816::{CommandApdu, ResponseApdu, Transport};
use icao9303::{bac, mrz, vreg};
use serde::Deserialize;
use sha2::{Digest, Sha256};

#[derive(FromArgs)]
/// Read ICAO 9303 eMRTD and VEVR-01 vehicle-registration smart-card data
/// from recorded APDU traces and BER-TLV `.bin` dumps.
struct TopLevel {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    ReadMrtd(ReadMrtdArgs),
    ReadVehicleRegistration(ReadVehicleRegistrationArgs),
}

#[derive(FromArgs)]
/// Perform BAC and stand up a Secure Messaging session against a recorded
/// eMRTD APDU trace, then read EF.COM over it.
#[argh(subcommand, name = "read-mrtd")]
struct ReadMrtdArgs {
    /// path to a JSON-recorded command/response APDU trace
    #[argh(option)]
    trace: PathBuf,

    /// MRZ text; defaults to the MRZ environment variable
    #[argh(option)]
    mrz: Option<String>,
}

#[derive(FromArgs)]
/// Decode and verify every VEVR-01 `.bin` dump in a directory.
#[argh(subcommand, name = "read-vehicle-registration")]
struct ReadVehicleRegistrationArgs {
    /// directory containing four-digit-hex-named `.bin` files
    #[argh(option)]
    dir: PathBuf,
}

/// One recorded command/response half from a trace file. The command is
/// kept only for operator-facing logging — trace playback is positional,
/// not content-matched, since BAC's own `EXTERNAL AUTHENTICATE` payload
/// differs on every run by design (fresh randomness each handshake).
#[derive(Deserialize)]
struct TraceEntry {
    command: String,
    response: String,
}

struct TraceTransport {
    responses: VecDeque<ResponseApdu>,
}

impl Transport for TraceTransport {
    fn transmit(&mut self, command: &CommandApdu) -> icao9303::Result<ResponseApdu> {
        tracing::debug!(
            cla = command.cla,
            ins = command.ins,
            p1 = command.p1,
            p2 = command.p2,
            "replaying recorded command"
        );
        self.responses.pop_front().ok_or(Error::UnexpectedEof)
    }
}

fn load_trace(path: &PathBuf) -> Result<VecDeque<ResponseApdu>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading trace file {}", path.display()))?;
    let entries: Vec<TraceEntry> = serde_json::from_str(&text).context("parsing trace JSON")?;

    let mut responses = VecDeque::with_capacity(entries.len());
    for entry in entries {
        tracing::debug!(command = %entry.command, "loaded recorded command");
        let response_hex: String = entry.response.split_whitespace().collect();
        let response_bytes = hex::decode(&response_hex)
            .with_context(|| format!("decoding response hex {response_hex:?}"))?;
        responses.push_back(ResponseApdu::from_bytes(&response_bytes)?);
    }
    Ok(responses)
}

fn read_mrtd(args: ReadMrtdArgs) -> Result<()> {
    let responses = load_trace(&args.trace)?;
    let transport = TraceTransport { responses };
    let mut card = Icao9303::new(transport);

    let card_access = card
        .read_binary_short_ef(0x1C)
        .context("reading EF.CardAccess")?;
    tracing::info!(
        bytes = card_access.len(),
        "read EF.CardAccess (PACE-support signal; PACE itself is out of scope)"
    );

    let mrz_text = match args.mrz {
        Some(m) => m,
        None => std::env::var("MRZ")
            .context("reading MRZ (pass --mrz, or set the MRZ environment variable)")?,
    };
    let record = mrz::parse(&mrz_text).context("parsing MRZ")?;
    tracing::info!(document_number = %record.document_number, "parsed MRZ");

    let transport = card.into_inner();
    let sm = bac::perform_bac(transport, &record).context("performing BAC")?;
    tracing::info!("BAC complete; secure messaging session established");

    let mut secure_card = Icao9303::new(sm);
    let ef_com = secure_card
        .read_elementary_file(0x0101)
        .context("reading EF.COM over secure messaging")?;
    println!("EF.COM: {}", hex::encode(&ef_com));
    Ok(())
}

fn read_vehicle_registration(args: ReadVehicleRegistrationArgs) -> Result<()> {
    let pattern = args.dir.join("*.bin");
    let pattern = pattern.to_string_lossy().into_owned();

    let mut found_any = false;
    for entry in glob::glob(&pattern).context("globbing .bin files")? {
        let path = entry.context("reading directory entry")?;
        found_any = true;

        let bytes = std::fs::read(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file = match vreg::VehicleRegistrationFile::decode(&bytes) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "not a VEVR-01 BER-TLV stream");
                continue;
            }
        };

        let cert_fingerprint = Sha256::digest(&file.certificate_der);
        tracing::debug!(
            file = %path.display(),
            cert_sha256 = %hex::encode(cert_fingerprint),
            cert_b64 = %STANDARD.encode(&file.certificate_der),
            "decoded VEVR-01 objects"
        );

        match file.verify() {
            Ok(()) => {
                tracing::info!(file = %path.display(), "signature verified");
                println!("{}: OK", path.display());
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "signature verification failed");
                println!("{}: FAILED ({err})", path.display());
            }
        }
    }

    if !found_any {
        bail!("no .bin files found in {}", args.dir.display());
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let args: TopLevel = argh::from_env();
    match args.command {
        Command::ReadMrtd(cmd) => read_mrtd(cmd),
        Command::ReadVehicleRegistration(cmd) => read_vehicle_registration(cmd),
    }
}
