use std::fmt::Write as _;

use {
    base64::Engine,
    sha2::{Digest, Sha256 as Sha256Hasher, Sha512 as Sha512Hasher},
};

use crate::{
    error::{Error, Result},
    script::Verb,
};

use super::{VerbOutput, arg};

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

pub fn run(verb: Verb, args: &[String]) -> Result<VerbOutput> {
    let input = arg(args, 0, verb)?;
    let out = match verb {
        Verb::Base64Encode => base64::engine::general_purpose::STANDARD.encode(input.as_bytes()),
        Verb::Base64Decode => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(input.trim())
                .map_err(|e| Error::message(format!("invalid base64: {e}")))?;
            String::from_utf8(bytes)
                .map_err(|_| Error::message("decoded bytes are not valid UTF-8"))?
        },
        Verb::HexEncode => hex(input.as_bytes()),
        Verb::HexDecode => {
            let cleaned = input.trim();
            if cleaned.len() % 2 != 0 {
                return Err(Error::message("hex input has odd length"));
            }
            let bytes: Option<Vec<u8>> = (0..cleaned.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&cleaned[i..i + 2], 16).ok())
                .collect();
            let bytes = bytes.ok_or_else(|| Error::message("invalid hex input"))?;
            String::from_utf8(bytes)
                .map_err(|_| Error::message("decoded bytes are not valid UTF-8"))?
        },
        Verb::UrlEncode => urlencoding::encode(input).into_owned(),
        Verb::UrlDecode => urlencoding::decode(input)
            .map_err(|e| Error::message(format!("invalid url encoding: {e}")))?
            .into_owned(),
        Verb::HtmlEscape => input
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&#39;"),
        Verb::Sha256 => hex(&Sha256Hasher::digest(input.as_bytes())),
        Verb::Sha512 => hex(&Sha512Hasher::digest(input.as_bytes())),
        other => return Err(Error::message(format!("{other} is not an encoding verb"))),
    };
    Ok(VerbOutput::text(out))
}
