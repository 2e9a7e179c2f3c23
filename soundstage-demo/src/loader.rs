use anyhow::{Context, Result, anyhow};
use rubato::{FftFixedIn, Resampler};
use soundstage::Sound;
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
        io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    },
    default::{get_codecs, get_probe},
};

const RESAMPLE_CHUNK: usize = 1024;

/// How a decoded file is turned into a [`Sound`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Resample to this rate if the file differs
    pub sample_rate: Option<u32>,
    /// Average all channels into one, for positional effects
    pub mono: bool,
}

/// Decodes an audio file (WAV, FLAC, MP3, OGG, ...) into a sound named after the file.
pub fn load_sound(path: &Path, options: LoadOptions) -> Result<Sound> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| anyhow!("Failed to probe audio format: {:?}", e))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track found"))?;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Sample rate not found"))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| anyhow!("Channel count not found"))?
        .count() as u16;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| anyhow!("Failed to create decoder: {:?}", e))?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(_)) => break, // end-of-file
            Err(e) => return Err(anyhow!("Error reading packet: {:?}", e)),
        };

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(Error::IoError(_)) => break,
            Err(Error::DecodeError(_)) => continue, // recoverable corruption
            Err(e) => return Err(anyhow!("Error decoding packet: {:?}", e)),
        };

        let spec = *decoded.spec();
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    let (mut samples, channels) = if options.mono && channels > 1 {
        (downmix(&samples, channels as usize), 1)
    } else {
        (samples, channels)
    };

    let mut rate = sample_rate;
    if let Some(target) = options.sample_rate {
        if target != sample_rate {
            samples = resample(&samples, channels as usize, sample_rate, target)?;
            rate = target;
        }
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("sound")
        .to_string();
    log::info!(
        "Loaded '{}': {} Hz, {} channel(s), {} frames",
        name,
        rate,
        channels,
        samples.len() / channels as usize
    );
    Ok(Sound::new(name, samples, rate, channels)?)
}

fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resamples interleaved audio by de-interleaving, resampling every channel, and
/// re-interleaving.
fn resample(samples: &[f32], channels: usize, from: u32, to: u32) -> Result<Vec<f32>> {
    let mut resampler = FftFixedIn::<f32>::new(
        from as usize,
        to as usize,
        RESAMPLE_CHUNK,
        2, // sub_chunks
        channels,
    )
    .map_err(|e| anyhow!("Failed to create resampler: {}", e))?;

    let frames = samples.len() / channels;
    let planar: Vec<Vec<f32>> = (0..channels)
        .map(|channel| samples.iter().skip(channel).step_by(channels).copied().collect())
        .collect();

    let mut output: Vec<Vec<f32>> = vec![Vec::new(); channels];
    let mut position = 0;
    while position < frames {
        let take = (frames - position).min(RESAMPLE_CHUNK);
        // Pad the last chunk to the fixed input size
        let chunk: Vec<Vec<f32>> = planar
            .iter()
            .map(|channel| {
                let mut chunk = vec![0.0f32; RESAMPLE_CHUNK];
                chunk[..take].copy_from_slice(&channel[position..position + take]);
                chunk
            })
            .collect();

        let waves_out = resampler
            .process(&chunk, None)
            .map_err(|e| anyhow!("Resampling error: {}", e))?;
        for (out, wave) in output.iter_mut().zip(waves_out) {
            out.extend_from_slice(&wave);
        }
        position += take;
    }

    let expected = (frames as u64 * to as u64 / from as u64) as usize;
    let produced = output.first().map_or(0, |channel| channel.len().min(expected));
    let mut interleaved = Vec::with_capacity(produced * channels);
    for frame in 0..produced {
        for channel in &output {
            interleaved.push(channel[frame]);
        }
    }
    Ok(interleaved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_averages_channels() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
    }

    #[test]
    fn test_resample_keeps_channels_interleaved() {
        let frames = 4800;
        let samples: Vec<f32> = (0..frames).flat_map(|_| [0.25, -0.25]).collect();
        let resampled = resample(&samples, 2, 48_000, 24_000).unwrap();

        assert_eq!(resampled.len() % 2, 0);
        let out_frames = resampled.len() / 2;
        assert!(out_frames <= frames / 2 && out_frames > frames / 2 - RESAMPLE_CHUNK);
    }
}
