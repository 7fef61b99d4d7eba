//! Reading the X authority file.
//!
//! `~/.Xauthority` (or `$XAUTHORITY`) is a sequence of entries, each a
//! big-endian u16 address family followed by four length-prefixed fields:
//! address, display number, authorization name, authorization data. The
//! connection forwards the data of the first entry matching the target
//! display; failure to find one degrades to an unauthenticated attempt.

use std::env;
use std::fs;
use std::io;

/// The only authorization protocol this client forwards.
pub(crate) const MIT_MAGIC_COOKIE_1: &str = "MIT-MAGIC-COOKIE-1";

/// Family value for local (non-network) connections, per Xauth.h.
const FAMILY_LOCAL: u16 = 256;

/// Family value matching any address.
const FAMILY_WILD: u16 = 65535;

/// Why no authority entry could be produced.
#[derive(Debug, thiserror::Error)]
pub(crate) enum AuthError {
    #[error("authority file not found: neither $XAUTHORITY nor $HOME is set")]
    NoPath,

    #[error("could not read authority file: {0}")]
    Io(#[from] io::Error),

    #[error("malformed authority file")]
    Malformed,

    #[error("no authority entry for display {0}")]
    NoEntry(String),
}

/// Look up the authorization entry for `display` (the display number as a
/// string). `hostname` is the display's host part; empty or `localhost`
/// means the local machine.
pub(crate) fn read_authority(
    hostname: &str,
    display: &str,
) -> Result<(String, Vec<u8>), AuthError> {
    let path = env::var("XAUTHORITY")
        .ok()
        .filter(|p| !p.is_empty())
        .or_else(|| {
            env::var("HOME")
                .ok()
                .filter(|h| !h.is_empty())
                .map(|h| format!("{h}/.Xauthority"))
        })
        .ok_or(AuthError::NoPath)?;

    let hostname = if hostname.is_empty() || hostname == "localhost" {
        env::var("HOSTNAME").unwrap_or_default()
    } else {
        hostname.to_owned()
    };

    select_entry(&fs::read(path)?, &hostname, display)
}

/// Scan the entry list for the first match.
fn select_entry(
    data: &[u8],
    hostname: &str,
    display: &str,
) -> Result<(String, Vec<u8>), AuthError> {
    let mut at = 0usize;
    while at < data.len() {
        let family = read_u16_be(data, &mut at)?;
        let address = read_field(data, &mut at)?;
        let number = read_field(data, &mut at)?;
        let name = read_field(data, &mut at)?;
        let auth_data = read_field(data, &mut at)?;

        let host_matches = family == FAMILY_WILD
            || (family == FAMILY_LOCAL && (hostname.is_empty() || address == hostname.as_bytes()));
        let display_matches = number.is_empty() || number == display.as_bytes();
        if host_matches && display_matches {
            return Ok((
                String::from_utf8_lossy(name).into_owned(),
                auth_data.to_vec(),
            ));
        }
    }
    Err(AuthError::NoEntry(display.to_owned()))
}

fn read_u16_be(data: &[u8], at: &mut usize) -> Result<u16, AuthError> {
    if *at + 2 > data.len() {
        return Err(AuthError::Malformed);
    }
    let value = u16::from_be_bytes([data[*at], data[*at + 1]]);
    *at += 2;
    Ok(value)
}

fn read_field<'a>(data: &'a [u8], at: &mut usize) -> Result<&'a [u8], AuthError> {
    let len = read_u16_be(data, at)? as usize;
    if *at + len > data.len() {
        return Err(AuthError::Malformed);
    }
    let field = &data[*at..*at + len];
    *at += len;
    Ok(field)
}
