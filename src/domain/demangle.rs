//! Legacy Rust symbol demangling (`_ZN...E`).
//!
//! Each path segment is length-prefixed; a trailing `17h<16 hex>` segment is
//! the crate hash and is dropped. Symbols that are not in this shape, or that
//! carry an unknown escape, come back unchanged.

/// Pure demangling function threaded through the analysis.
pub type Demangler = fn(&str) -> String;

pub fn demangle(symbol: &str) -> String {
    demangle_legacy(symbol).unwrap_or_else(|| symbol.to_string())
}

fn demangle_legacy(symbol: &str) -> Option<String> {
    let inner = symbol
        .strip_prefix("_ZN")
        .or_else(|| symbol.strip_prefix("ZN"))?
        .strip_suffix('E')?;

    let mut segments = Vec::new();
    let mut rest = inner;
    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }
        let len: usize = rest[..digits].parse().ok()?;
        rest = &rest[digits..];
        let segment = rest.get(..len)?;
        rest = &rest[len..];

        if rest.is_empty() && is_hash(segment) {
            break;
        }
        segments.push(unescape(segment)?);
    }

    if segments.is_empty() {
        return None;
    }
    Some(segments.join("::"))
}

fn is_hash(segment: &str) -> bool {
    segment.len() == 17
        && segment
            .strip_prefix('h')
            .is_some_and(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn unescape(segment: &str) -> Option<String> {
    let mut rest = segment.strip_prefix('_').filter(|s| s.starts_with('$')).unwrap_or(segment);
    let mut out = String::with_capacity(rest.len());

    while let Some(pos) = rest.find(['$', '.']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("..") {
            out.push_str("::");
            rest = after;
            continue;
        }
        if let Some(after) = tail.strip_prefix('.') {
            out.push('.');
            rest = after;
            continue;
        }

        let body = &tail[1..];
        let end = body.find('$')?;
        out.push(decode_escape(&body[..end])?);
        rest = &body[end + 1..];
    }

    out.push_str(rest);
    Some(out)
}

fn decode_escape(escape: &str) -> Option<char> {
    let c = match escape {
        "SP" => '@',
        "BP" => '*',
        "RF" => '&',
        "LT" => '<',
        "GT" => '>',
        "LP" => '(',
        "RP" => ')',
        "C" => ',',
        _ => {
            let hex = escape.strip_prefix('u')?;
            return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
        }
    };
    Some(c)
}
