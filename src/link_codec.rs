use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::error::Error;
use std::fmt;
use url::Url;

const TOKEN_MARKER: &str = "get";
const TOKEN_DELIMITER: char = '-';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCodecError {
    ZeroChannel,
    InvalidMessageId(i64),
    InvalidRange { first: i64, last: i64 },
    /// payload is not base64 / ascii, lacks the marker, or carries non-numeric parts
    Malformed(String),
    /// composite is not an exact multiple of the channel multiplier
    DivisionMismatch { composite: u128, multiplier: u64 },
}

impl fmt::Display for LinkCodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkCodecError::ZeroChannel => write!(f, "Channel id must be nonzero"),
            LinkCodecError::InvalidMessageId(id) => {
                write!(f, "Message id must be positive, got {}", id)
            }
            LinkCodecError::InvalidRange { first, last } => {
                write!(f, "Invalid range: first id {} is after last id {}", first, last)
            }
            LinkCodecError::Malformed(reason) => write!(f, "Malformed token: {}", reason),
            LinkCodecError::DivisionMismatch {
                composite,
                multiplier,
            } => write!(
                f,
                "Malformed token: {} is not a multiple of {}",
                composite, multiplier
            ),
        }
    }
}

impl Error for LinkCodecError {}

impl LinkCodecError {
    /// true for every failure a user-supplied payload can cause
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            LinkCodecError::Malformed(_) | LinkCodecError::DivisionMismatch { .. }
        )
    }
}

/// message ids addressed by a decoded deep link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedLink {
    Single(i64),
    Range { first: i64, last: i64 },
}

impl DecodedLink {
    /// number of messages the link covers
    pub fn len(&self) -> u64 {
        match *self {
            DecodedLink::Single(_) => 1,
            DecodedLink::Range { first, last } => first.abs_diff(last) + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// ids in delivery order; a reversed range is walked backwards
    pub fn message_ids(&self) -> Box<dyn Iterator<Item = i64> + Send> {
        match *self {
            DecodedLink::Single(id) => Box::new(std::iter::once(id)),
            DecodedLink::Range { first, last } if first <= last => Box::new(first..=last),
            DecodedLink::Range { first, last } => Box::new((last..=first).rev()),
        }
    }
}

/// reversible message-id obfuscation bound to one storage channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCodec {
    multiplier: u64,
}

impl LinkCodec {
    pub fn new(channel_id: i64) -> Result<Self, LinkCodecError> {
        if channel_id == 0 {
            return Err(LinkCodecError::ZeroChannel);
        }
        Ok(Self {
            multiplier: channel_id.unsigned_abs(),
        })
    }

    pub fn multiplier(&self) -> u64 {
        self.multiplier
    }

    fn composite(&self, message_id: i64) -> Result<u128, LinkCodecError> {
        if message_id <= 0 {
            return Err(LinkCodecError::InvalidMessageId(message_id));
        }
        // both factors fit in 64 bits, so the product always fits in 128
        Ok(message_id as u128 * self.multiplier as u128)
    }

    pub fn encode_single(&self, message_id: i64) -> Result<String, LinkCodecError> {
        let composite = self.composite(message_id)?;
        Ok(encode_token(&format!("{}-{}", TOKEN_MARKER, composite)))
    }

    pub fn encode_range(&self, first_id: i64, last_id: i64) -> Result<String, LinkCodecError> {
        if first_id > last_id {
            return Err(LinkCodecError::InvalidRange {
                first: first_id,
                last: last_id,
            });
        }
        let first = self.composite(first_id)?;
        let last = self.composite(last_id)?;
        Ok(encode_token(&format!(
            "{}-{}-{}",
            TOKEN_MARKER, first, last
        )))
    }

    pub fn decode(&self, payload: &str) -> Result<DecodedLink, LinkCodecError> {
        let token = decode_token(payload)?;
        self.decode_token_text(&token)
    }

    /// parses the plain `get-<a>[-<b>]` form
    pub fn decode_token_text(&self, token: &str) -> Result<DecodedLink, LinkCodecError> {
        let mut parts = token.split(TOKEN_DELIMITER);
        if parts.next() != Some(TOKEN_MARKER) {
            return Err(LinkCodecError::Malformed(format!(
                "token does not start with '{}{}'",
                TOKEN_MARKER, TOKEN_DELIMITER
            )));
        }

        let numbers: Vec<&str> = parts.collect();
        match numbers.as_slice() {
            [single] => Ok(DecodedLink::Single(self.message_id(single)?)),
            [first, last] => Ok(DecodedLink::Range {
                first: self.message_id(first)?,
                last: self.message_id(last)?,
            }),
            _ => Err(LinkCodecError::Malformed(format!(
                "expected 1 or 2 numeric parts, found {}",
                numbers.len()
            ))),
        }
    }

    fn message_id(&self, digits: &str) -> Result<i64, LinkCodecError> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LinkCodecError::Malformed(format!(
                "'{}' is not a decimal number",
                digits
            )));
        }
        let composite: u128 = digits
            .parse()
            .map_err(|_| LinkCodecError::Malformed(format!("'{}' is out of range", digits)))?;

        let multiplier = self.multiplier as u128;
        if composite % multiplier != 0 {
            return Err(LinkCodecError::DivisionMismatch {
                composite,
                multiplier: self.multiplier,
            });
        }

        match i64::try_from(composite / multiplier) {
            Ok(id) if id > 0 => Ok(id),
            _ => Err(LinkCodecError::Malformed(format!(
                "{} does not map to a valid message id",
                composite
            ))),
        }
    }
}

pub fn encode_single(message_id: i64, channel_id: i64) -> Result<String, LinkCodecError> {
    LinkCodec::new(channel_id)?.encode_single(message_id)
}

pub fn encode_range(first_id: i64, last_id: i64, channel_id: i64) -> Result<String, LinkCodecError> {
    LinkCodec::new(channel_id)?.encode_range(first_id, last_id)
}

pub fn decode(payload: &str, channel_id: i64) -> Result<DecodedLink, LinkCodecError> {
    LinkCodec::new(channel_id)?.decode(payload)
}

fn encode_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(token.as_bytes())
}

fn decode_token(payload: &str) -> Result<String, LinkCodecError> {
    let trimmed = payload.trim().trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|e| LinkCodecError::Malformed(format!("invalid base64: {}", e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| LinkCodecError::Malformed("payload is not valid text".to_string()))?;
    if !text.is_ascii() {
        return Err(LinkCodecError::Malformed("payload is not ascii".to_string()));
    }
    Ok(text)
}

/// `https://t.me/<bot>?start=<payload>`
pub fn deep_link(bot_username: &str, payload: &str) -> String {
    format!("https://t.me/{}?start={}", bot_username, payload)
}

/// telegram share dialog prefilled with `link`
pub fn share_url(link: &str) -> Url {
    Url::parse_with_params("https://telegram.me/share/url", &[("url", link)])
        .expect("share endpoint is a valid url")
}
