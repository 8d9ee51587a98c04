//! MAC address parsing and canonical formatting

use std::fmt;
use std::str::FromStr;

use crate::WolError;

/// A 6-byte hardware address.
///
/// Parsed from `:`/`-` delimited hex tokens (`AA:BB:CC:DD:EE:FF`, `aa-bb-cc-dd-ee-ff`)
/// or from the 12-digit canonical storage form (`AABBCCDDEEFF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }

    /// Parse a delimited MAC. Any token count other than 6 or any non-hex token is rejected.
    pub fn parse_delimited(input: &str) -> Result<Self, WolError> {
        let tokens: Vec<&str> = input.trim().split([':', '-']).collect();
        if tokens.len() != 6 {
            return Err(WolError::Validation(format!(
                "MAC address must have 6 octets, got {}: {:?}",
                tokens.len(),
                input
            )));
        }

        let mut bytes = [0u8; 6];
        for (slot, token) in bytes.iter_mut().zip(tokens) {
            *slot = parse_octet(token)
                .ok_or_else(|| WolError::Validation(format!("Invalid MAC octet {:?} in {:?}", token, input)))?;
        }
        Ok(Self(bytes))
    }

    /// Canonical storage form: 12 upper-case hex digits, no delimiters.
    pub fn canonical(&self) -> String {
        self.0.iter().map(|b| format!("{:02X}", b)).collect()
    }

    fn parse_compact(input: &str) -> Option<Self> {
        if input.len() != 12 || !input.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 6];
        for (i, slot) in bytes.iter_mut().enumerate() {
            *slot = parse_octet(&input[i * 2..i * 2 + 2])?;
        }
        Some(Self(bytes))
    }
}

fn parse_octet(token: &str) -> Option<u8> {
    if token.is_empty() || token.len() > 2 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(token, 16).ok()
}

impl FromStr for MacAddress {
    type Err = WolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !trimmed.contains([':', '-']) {
            if let Some(mac) = Self::parse_compact(trimmed) {
                return Ok(mac);
            }
        }
        Self::parse_delimited(trimmed)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

/// Normalize user input into the canonical storage form, rejecting invalid values.
pub fn normalize_mac(input: &str) -> Result<String, WolError> {
    input.parse::<MacAddress>().map(|mac| mac.canonical())
}
