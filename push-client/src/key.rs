//! Conversion of base64url application server keys into raw bytes.

use base64::{
    alphabet,
    engine::{GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use snafu::{ensure, ResultExt, Snafu};

/// Length of an uncompressed P-256 public key, the only form push
/// services accept as an application server key.
pub const VAPID_PUBLIC_KEY_LEN: usize = 65;

// `atob` discards bits that don't complete a byte, so we do as well.
const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Decodes a base64url string, padded or not, into its bytes.
pub fn url_base64_to_bytes(input: &str) -> Result<Vec<u8>> {
    let padding = (4 - input.len() % 4) % 4;

    let mut standard = String::with_capacity(input.len() + padding);
    standard.extend(input.chars().map(|c| match c {
        '-' => '+',
        '_' => '/',
        c => c,
    }));
    standard.extend(std::iter::repeat('=').take(padding));

    ENGINE.decode(&standard).context(InvalidBase64Snafu)
}

/// Decodes a VAPID public key and checks that it has the size of an
/// uncompressed P-256 point.
pub fn decode_vapid_public_key(input: &str) -> Result<Vec<u8>> {
    let key = url_base64_to_bytes(input)?;
    ensure!(
        key.len() == VAPID_PUBLIC_KEY_LEN,
        WrongLengthSnafu { length: key.len() }
    );
    Ok(key)
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("The key is not valid base64url"))]
    InvalidBase64 { source: base64::DecodeError },

    #[snafu(display(
        "The key decodes to {} bytes but {} are required",
        length,
        VAPID_PUBLIC_KEY_LEN
    ))]
    WrongLength { length: usize },
}

type Result<T, E = Error> = std::result::Result<T, E>;
