//! OSC 7770 scanning and stripping.
//!
//! The shell hooks emit two private sequences into the output stream:
//!
//! - `ESC ] 7770 ; preexec BEL` - a foreground command is about to run
//! - `ESC ] 7770 ; precmd ; <exit code> BEL` - a new prompt was printed
//!
//! Both are stripped from the emulator-bound bytes. Sequences may be
//! fragmented across chunks at any byte boundary, so a per-session partial
//! buffer carries an unterminated trailing sequence into the next scan.

use std::collections::VecDeque;

/// `ESC ] 7 7 7 0 ;`
pub const OSC_PREFIX: &[u8] = b"\x1b]7770;";
const BEL: u8 = 0x07;
const ESC: u8 = 0x1b;

/// Protocol payloads are a handful of bytes; a partial that grows past this
/// is not our protocol and is passed through as ordinary output.
const MAX_PARTIAL: usize = 4096;

/// A parsed shell-integration event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OscEvent {
    /// The shell is about to run a foreground command.
    Preexec,
    /// The shell printed a new prompt; carries `$?` of the prior command.
    Precmd { exit_code: i32 },
}

/// Result of scanning one chunk.
#[derive(Debug, Default, PartialEq)]
pub struct ScanOutcome {
    /// Input bytes with every complete OSC 7770 sequence removed.
    pub cleaned: Vec<u8>,
    /// Events parsed from the removed sequences, in stream order.
    pub events: Vec<OscEvent>,
}

fn parse_payload(payload: &[u8]) -> Option<OscEvent> {
    if payload == b"preexec" {
        return Some(OscEvent::Preexec);
    }
    let rest = payload.strip_prefix(b"precmd;")?;
    let exit_code = std::str::from_utf8(rest).ok()?.parse().ok()?;
    Some(OscEvent::Precmd { exit_code })
}

fn find_last_prefix(data: &[u8]) -> Option<usize> {
    if data.len() < OSC_PREFIX.len() {
        return None;
    }
    data.windows(OSC_PREFIX.len())
        .rposition(|window| window == OSC_PREFIX)
}

/// Scans one chunk, reassembling sequences split across chunk boundaries via
/// `partial`. Complete sequences are stripped and parsed; an unterminated
/// trailing sequence is stashed for the next call.
pub fn scan(partial: &mut VecDeque<u8>, chunk: &[u8]) -> ScanOutcome {
    let mut data = Vec::with_capacity(partial.len() + chunk.len());
    data.extend(partial.drain(..));
    data.extend_from_slice(chunk);

    if let Some(idx) = find_last_prefix(&data) {
        let terminated = data[idx..].contains(&BEL);
        if !terminated {
            let tail = data.split_off(idx);
            if tail.len() <= MAX_PARTIAL {
                partial.extend(tail);
            } else {
                // Never a real protocol sequence; let it through.
                data.extend(tail);
            }
        }
    }

    let mut outcome = ScanOutcome {
        cleaned: Vec::with_capacity(data.len()),
        events: Vec::new(),
    };
    let mut i = 0;
    while i < data.len() {
        if data[i..].starts_with(OSC_PREFIX) {
            if let Some(rel) = data[i + OSC_PREFIX.len()..]
                .iter()
                .position(|&b| b == BEL)
            {
                let payload = &data[i + OSC_PREFIX.len()..i + OSC_PREFIX.len() + rel];
                if let Some(event) = parse_payload(payload) {
                    outcome.events.push(event);
                }
                i += OSC_PREFIX.len() + rel + 1;
                continue;
            }
        }
        outcome.cleaned.push(data[i]);
        i += 1;
    }
    outcome
}

/// Removes ANSI escape sequences (CSI, OSC, two-byte escapes) so heuristics
/// can look at the text a user actually sees.
pub fn strip_ansi(bytes: &[u8]) -> String {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != ESC {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        i += 1;
        match bytes.get(i) {
            Some(b'[') => {
                // CSI: parameters then a final byte in 0x40..=0x7e
                i += 1;
                while let Some(&b) = bytes.get(i) {
                    i += 1;
                    if (0x40..=0x7e).contains(&b) {
                        break;
                    }
                }
            }
            Some(b']') => {
                // OSC: terminated by BEL or ST (ESC \)
                i += 1;
                while let Some(&b) = bytes.get(i) {
                    if b == BEL {
                        i += 1;
                        break;
                    }
                    if b == ESC && bytes.get(i + 1) == Some(&b'\\') {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            Some(_) => i += 1,
            None => break,
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Shell-prompt heuristic: does the final non-empty de-ANSI'd line end in a
/// prompt symbol? `:` and `?` are deliberately excluded so password and Duo
/// prompts never match.
pub fn ends_with_prompt(bytes: &[u8]) -> bool {
    let text = strip_ansi(bytes);
    let Some(line) = text.lines().rev().find(|line| !line.trim().is_empty()) else {
        return false;
    };
    matches!(line.trim_end().chars().last(), Some('#' | '$' | '%' | '>'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;

    fn scan_all(chunks: &[&[u8]]) -> (Vec<u8>, Vec<OscEvent>) {
        let mut partial = VecDeque::new();
        let mut cleaned = Vec::new();
        let mut events = Vec::new();
        for chunk in chunks {
            let outcome = scan(&mut partial, chunk);
            cleaned.extend(outcome.cleaned);
            events.extend(outcome.events);
        }
        (cleaned, events)
    }

    // ==================== Scanning ====================

    #[test]
    fn test_plain_bytes_pass_through() {
        let (cleaned, events) = scan_all(&[b"hello world"]);
        assert_eq!(cleaned, b"hello world".to_vec());
        assert!(events.is_empty());
    }

    #[test]
    fn test_complete_preexec_is_stripped_and_parsed() {
        let (cleaned, events) = scan_all(&[b"a\x1b]7770;preexec\x07b"]);
        assert_eq!(cleaned, b"ab".to_vec());
        assert_eq!(events, vec![OscEvent::Preexec]);
    }

    #[test_case(b"precmd;0", OscEvent::Precmd { exit_code: 0 } ; "zero exit")]
    #[test_case(b"precmd;130", OscEvent::Precmd { exit_code: 130 } ; "signal exit")]
    fn test_precmd_payloads(payload: &[u8], expected: OscEvent) {
        let mut seq = Vec::new();
        seq.extend_from_slice(OSC_PREFIX);
        seq.extend_from_slice(payload);
        seq.push(0x07);
        let (cleaned, events) = scan_all(&[&seq]);
        assert!(cleaned.is_empty());
        assert_eq!(events, vec![expected]);
    }

    #[test]
    fn test_garbage_payload_is_stripped_without_event() {
        let (cleaned, events) = scan_all(&[b"\x1b]7770;mystery\x07ok"]);
        assert_eq!(cleaned, b"ok".to_vec());
        assert!(events.is_empty());
    }

    #[test]
    fn test_sequence_split_across_chunks() {
        // Scenario: "output" + partial preexec, then the rest + "more".
        let (cleaned, events) = scan_all(&[b"output\x1b]7770;pre", b"exec\x07more"]);
        assert_eq!(cleaned, b"outputmore".to_vec());
        assert_eq!(events, vec![OscEvent::Preexec]);
    }

    #[test]
    fn test_split_inside_escape_prefix() {
        let (cleaned, events) = scan_all(&[b"x\x1b", b"]7770;precmd;1\x07y"]);
        assert_eq!(cleaned, b"xy".to_vec());
        assert_eq!(events, vec![OscEvent::Precmd { exit_code: 1 }]);
    }

    #[test]
    fn test_bytes_before_partial_are_emitted_immediately() {
        let mut partial = VecDeque::new();
        let outcome = scan(&mut partial, b"visible\x1b]7770;pre");
        assert_eq!(outcome.cleaned, b"visible".to_vec());
        assert!(!partial.is_empty());
    }

    #[test]
    fn test_two_sequences_in_one_chunk() {
        let (cleaned, events) =
            scan_all(&[b"\x1b]7770;preexec\x07mid\x1b]7770;precmd;0\x07end"]);
        assert_eq!(cleaned, b"midend".to_vec());
        assert_eq!(
            events,
            vec![OscEvent::Preexec, OscEvent::Precmd { exit_code: 0 }]
        );
    }

    // ==================== ANSI stripping & prompt heuristic ====================

    #[test]
    fn test_strip_ansi_removes_csi_and_osc() {
        let input = b"\x1b[1;32muser@host\x1b[0m:\x1b]0;title\x07~$ ";
        assert_eq!(strip_ansi(input), "user@host:~$ ");
    }

    #[test_case(b"user@host:~$ ", true ; "dollar prompt")]
    #[test_case(b"root# ", true ; "hash prompt")]
    #[test_case(b"zsh% ", true ; "percent prompt")]
    #[test_case(b"fish> ", true ; "angle prompt")]
    #[test_case(b"Password: ", false ; "password colon excluded")]
    #[test_case(b"Passcode or option (1-3)? ", false ; "duo question excluded")]
    #[test_case(b"building...", false ; "ordinary output")]
    #[test_case(b"", false ; "empty chunk")]
    fn test_prompt_heuristic(bytes: &[u8], expected: bool) {
        assert_eq!(ends_with_prompt(bytes), expected);
    }

    #[test]
    fn test_prompt_heuristic_uses_last_non_empty_line() {
        assert!(ends_with_prompt(b"make: done\nuser@host $ \n\n"));
        assert!(!ends_with_prompt(b"user@host $ \nstill running\n"));
    }

    // ==================== Properties ====================

    #[derive(Clone, Debug)]
    enum Segment {
        Data(Vec<u8>),
        Osc(OscEvent),
    }

    fn encode(event: OscEvent) -> Vec<u8> {
        let mut seq = Vec::from(OSC_PREFIX);
        match event {
            OscEvent::Preexec => seq.extend_from_slice(b"preexec"),
            OscEvent::Precmd { exit_code } => {
                seq.extend_from_slice(format!("precmd;{exit_code}").as_bytes())
            }
        }
        seq.push(0x07);
        seq
    }

    fn segment_strategy() -> impl Strategy<Value = Segment> {
        prop_oneof![
            proptest::collection::vec(
                proptest::sample::select(b"abc \n0123xyz".to_vec()),
                0..12
            )
            .prop_map(Segment::Data),
            Just(Segment::Osc(OscEvent::Preexec)),
            (0i32..256).prop_map(|code| Segment::Osc(OscEvent::Precmd { exit_code: code })),
        ]
    }

    proptest! {
        /// For any interleaving of OSC sequences with data and any chunk
        /// partition, the concatenated cleaned output equals the data with
        /// all complete sequences removed, and the parsed events equal the
        /// sequence of embedded events.
        #[test]
        fn prop_osc_roundtrip_any_partition(
            segments in proptest::collection::vec(segment_strategy(), 0..8),
            cuts in proptest::collection::vec(0usize..512, 0..6),
        ) {
            let mut stream = Vec::new();
            let mut expected_clean = Vec::new();
            let mut expected_events = Vec::new();
            for segment in &segments {
                match segment {
                    Segment::Data(bytes) => {
                        stream.extend_from_slice(bytes);
                        expected_clean.extend_from_slice(bytes);
                    }
                    Segment::Osc(event) => {
                        stream.extend(encode(*event));
                        expected_events.push(*event);
                    }
                }
            }

            let mut cut_points: Vec<usize> =
                cuts.iter().map(|c| c % (stream.len() + 1)).collect();
            cut_points.sort_unstable();
            cut_points.dedup();

            let mut chunks: Vec<&[u8]> = Vec::new();
            let mut start = 0;
            for &cut in &cut_points {
                chunks.push(&stream[start..cut]);
                start = cut;
            }
            chunks.push(&stream[start..]);

            let (cleaned, events) = scan_all(&chunks);
            prop_assert_eq!(cleaned, expected_clean);
            prop_assert_eq!(events, expected_events);
        }
    }
}
