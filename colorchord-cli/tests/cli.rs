use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn colorchord() -> Command {
    Command::new(env!("CARGO_BIN_EXE_colorchord"))
}

/// Writes one second of a 16-bit mono sine at 44.1 kHz.
fn write_tone(path: &Path, freq: f64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44_100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..44_100 {
        let t = i as f64 / 44_100.0;
        let sample = 0.25 * (std::f64::consts::TAU * freq * t).sin();
        writer.write_sample((sample * i16::MAX as f64) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn test_wav_renders_frames() {
    let temp = TempDir::new().unwrap();
    let wav = temp.path().join("tone.wav");
    write_tone(&wav, 130.81);

    let output = colorchord()
        .args(["--wav", wav.to_str().unwrap(), "--every", "10"])
        .env_remove("NO_COLOR")
        .output()
        .expect("failed to run colorchord");

    assert!(output.status.success(), "colorchord failed: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    // 8000 samples at 128 per frame, every tenth frame printed
    assert_eq!(stdout.lines().count(), 6);
    assert!(stdout.contains("\x1b[38;2;"));
}

#[test]
fn test_save_config_writes_effective_profile() {
    let temp = TempDir::new().unwrap();
    let wav = temp.path().join("tone.wav");
    let profile = temp.path().join("profile.json");
    write_tone(&wav, 220.0);

    let output = colorchord()
        .args([
            "--wav",
            wav.to_str().unwrap(),
            "--channels",
            "24",
            "--policy",
            "dominant",
            "--save-config",
            profile.to_str().unwrap(),
        ])
        .output()
        .expect("failed to run colorchord");
    assert!(output.status.success());

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&profile).unwrap()).unwrap();
    assert_eq!(json["output"]["channels"], 24);
    assert_eq!(json["output"]["policy"], "dominant");
    assert_eq!(json["bins_per_octave"], 24);
}

#[test]
fn test_invalid_config_fails() {
    let temp = TempDir::new().unwrap();
    let wav = temp.path().join("tone.wav");
    write_tone(&wav, 220.0);

    let output = colorchord()
        .args(["--wav", wav.to_str().unwrap(), "--channels", "0"])
        .output()
        .expect("failed to run colorchord");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid engine configuration"));
}
