// src/move_list.rs - Plain-text move list reader for the command line driver
//
// One move per line, made of `LETTER<number>` words:
//
//     # square at 20 mm/s
//     X10 Y0 F20
//     X10 Y10
//     R X0 Y0        # rapid back
//
// Axis letters set target coordinates in mm; `F` sets the feedrate in mm/s.
// A bare `R` turns the line into a rapid move. A bare `H` on a line of its
// own reports that the machine sits on its home switches.
use crate::axes::Axis;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MoveListError {
    #[error("Line {line}: unknown word '{word}'")]
    InvalidWord { line: usize, word: String },
    #[error("Line {line}: invalid number in '{word}'")]
    InvalidNumber { line: usize, word: String },
    #[error("Line {line}: 'H' takes no other words")]
    HomeWithMove { line: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Coordinated,
    Rapid,
    Home,
}

/// One parsed line. Axes not listed keep their current position.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveRequest {
    pub kind: MoveKind,
    pub axes: Vec<(Axis, f64)>,
    pub feedrate: Option<f64>,
    /// 1-based source line.
    pub line: usize,
}

pub fn parse_move_list(input: &str) -> Result<Vec<MoveRequest>, MoveListError> {
    let mut moves = Vec::new();
    for (index, raw) in input.lines().enumerate() {
        if let Some(request) = parse_line(raw, index + 1)? {
            moves.push(request);
        }
    }
    tracing::debug!("Parsed {} move(s)", moves.len());
    Ok(moves)
}

fn parse_line(raw: &str, line: usize) -> Result<Option<MoveRequest>, MoveListError> {
    let content = raw.split('#').next().unwrap_or("").trim();
    if content.is_empty() {
        return Ok(None);
    }

    let mut request = MoveRequest {
        kind: MoveKind::Coordinated,
        axes: Vec::new(),
        feedrate: None,
        line,
    };
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.iter().any(|w| w.eq_ignore_ascii_case("h")) {
        if words.len() > 1 {
            return Err(MoveListError::HomeWithMove { line });
        }
        request.kind = MoveKind::Home;
        return Ok(Some(request));
    }
    for word in words {
        let mut chars = word.chars();
        let Some(letter) = chars.next() else {
            continue;
        };
        let value = chars.as_str();
        if value.is_empty() {
            if letter.eq_ignore_ascii_case(&'r') {
                request.kind = MoveKind::Rapid;
                continue;
            }
            return Err(MoveListError::InvalidWord { line, word: word.to_string() });
        }

        let number: f64 = value
            .parse()
            .ok()
            .filter(|n: &f64| n.is_finite())
            .ok_or_else(|| MoveListError::InvalidNumber { line, word: word.to_string() })?;
        if letter.eq_ignore_ascii_case(&'f') {
            request.feedrate = Some(number);
        } else if let Some(axis) = Axis::from_letter(letter) {
            match request.axes.iter_mut().find(|(a, _)| *a == axis) {
                Some(entry) => entry.1 = number,
                None => request.axes.push((axis, number)),
            }
        } else {
            return Err(MoveListError::InvalidWord { line, word: word.to_string() });
        }
    }
    Ok(Some(request))
}
