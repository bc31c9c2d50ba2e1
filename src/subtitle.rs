use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Split `text` into groups of `words_per_cue` words and spread them over
/// `duration` seconds in proportion to their word offsets.
pub fn build_cues(text: &str, duration: f64, words_per_cue: usize) -> Vec<Cue> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || duration <= 0.0 || words_per_cue == 0 {
        return Vec::new();
    }

    let words_per_second = words.len() as f64 / duration;
    words
        .chunks(words_per_cue)
        .enumerate()
        .map(|(i, group)| {
            let first = i * words_per_cue;
            let start = first as f64 / words_per_second;
            let end = ((first + words_per_cue) as f64 / words_per_second).min(duration);
            Cue {
                start,
                end,
                text: group.join(" "),
            }
        })
        .collect()
}

pub fn write_srt(path: &Path, cues: &[Cue]) -> anyhow::Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    for (i, cue) in cues.iter().enumerate() {
        writeln!(f, "{}", i + 1)?;
        writeln!(f, "{} --> {}", format_srt_time(cue.start), format_srt_time(cue.end))?;
        for line in wrap_text(&cue.text, 40) {
            writeln!(f, "{}", line)?;
        }
        writeln!(f)?;
    }
    f.flush()?;
    Ok(())
}

/// `HH:MM:SS,mmm`, rounded to the nearest millisecond.
fn format_srt_time(seconds: f64) -> String {
    let millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let (secs, ms) = (millis / 1000, millis % 1000);
    format!(
        "{:02}:{:02}:{:02},{ms:03}",
        secs / 3600,
        secs / 60 % 60,
        secs % 60
    )
}

fn wrap_text(s: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in s.split_whitespace() {
        if !current.is_empty() && current.len() + word.len() + 1 > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
