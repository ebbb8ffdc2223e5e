//! LRC lyrics parser (§4.D), used by the tag reader when resolving an
//! external `.lrc` sidecar. Pure translation of the spec: no teacher or
//! pack file parses this format, so there is nothing to ground this on
//! beyond the specification itself.

#[cfg(windows)]
const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
const LINE_SEPARATOR: &str = "\n";

fn split_leading_bracket(line: &str) -> Option<(&str, &str)> {
    let line = line.strip_prefix('[')?;
    let close = line.find(']')?;
    Some((&line[..close], &line[close + 1..]))
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// `[mm:ss.xx]` or `[mm:ss]` — a playback-position tag.
fn is_timestamp_tag(inner: &str) -> bool {
    let Some((minutes, seconds)) = inner.split_once(':') else {
        return false;
    };
    if !is_all_digits(minutes) {
        return false;
    }
    match seconds.split_once('.') {
        Some((whole, frac)) => is_all_digits(whole) && is_all_digits(frac),
        None => is_all_digits(seconds),
    }
}

/// `[tag:value]` where `tag` matches `[a-zA-Z]+` — a metadata header line,
/// e.g. `[ar:Artist Name]`.
fn is_metadata_tag(inner: &str) -> bool {
    let Some((tag, _value)) = inner.split_once(':') else {
        return false;
    };
    !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphabetic())
}

/// Parse LRC contents into plain lyric text. Metadata lines are dropped
/// entirely; timestamp tags are stripped from lyric lines; blank lines are
/// dropped; everything else passes through trimmed.
pub fn parse(contents: &str) -> String {
    let mut out = Vec::new();

    for raw in contents.lines() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        if let Some((inner, _)) = split_leading_bracket(line)
            && is_metadata_tag(inner)
        {
            continue;
        }

        let mut rest = line;
        while let Some((inner, tail)) = split_leading_bracket(rest) {
            if !is_timestamp_tag(inner) {
                break;
            }
            rest = tail;
        }

        let text = rest.trim();
        if !text.is_empty() {
            out.push(text.to_string());
        }
    }

    out.join(LINE_SEPARATOR)
}
