use std::path::Path;

use hound::WavReader;
use tokio::process::Command;

use crate::error::PipelineError;

pub fn wav_duration_seconds(path: &Path) -> anyhow::Result<f64> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let frames = f64::from(reader.len()) / f64::from(spec.channels);
    Ok(frames / f64::from(spec.sample_rate))
}

/// Duration of any audio file. WAV is read directly, everything else goes
/// through `ffprobe`.
pub async fn duration_seconds(path: &Path) -> Result<f64, PipelineError> {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
    if is_wav {
        return wav_duration_seconds(path)
            .map_err(|e| PipelineError::Composition(format!("cannot read WAV duration: {e}")));
    }

    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-show_entries", "format=duration", "-of", "csv=p=0"])
        .arg(path)
        .output()
        .await
        .map_err(|e| PipelineError::Composition(format!("failed to run ffprobe: {e}")))?;
    if !output.status.success() {
        return Err(PipelineError::Composition(format!(
            "ffprobe failed on {}",
            path.display()
        )));
    }
    parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe_duration(raw: &str) -> Result<f64, PipelineError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| PipelineError::Composition(format!("unusable audio duration {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_wav_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..(8000 * 2 * 2) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let secs = duration_seconds(&path).await.unwrap();
        assert!((secs - 2.0).abs() < 1e-9);
    }

    #[test]
    fn parses_probe_output() {
        assert!((parse_probe_duration("42.5\n").unwrap() - 42.5).abs() < 1e-9);
        assert!(parse_probe_duration("N/A").is_err());
        assert!(parse_probe_duration("0").is_err());
    }
}
