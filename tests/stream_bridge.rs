use std::io::{self, Cursor, Read};

use quickcheck::{quickcheck, TestResult};

use mpadec::{Decoder, Encoding, SourceState, MAX_INPUT_RETRIES};

mod test_support;
use test_support::*;

fn bridge_to_end<R: Read>(decoder: &mut Decoder, source: R) -> io::Result<Vec<u8>> {
    let mut reader = decoder.decoder_reader(source, 44100, 2, Encoding::Signed16)?;
    let mut pcm = Vec::new();
    reader.read_to_end(&mut pcm)?;
    Ok(pcm)
}

#[test]
fn bridge_matches_pull_decoder() {
    let mut data = id3v2_tag(b"TIT2 tones");
    data.extend(tone_stream(4));
    data.extend(id3v1_tag());

    let mut pulled = Vec::new();
    let mut decoder = Decoder::new(None, None).unwrap();
    decoder.open(fixture("bridge_identity.mp3", &data)).unwrap();
    decoder.read_to_end(&mut pulled).unwrap();
    assert!(s16_samples(&pulled).iter().filter(|&&s| s != 0).count() > pulled.len() / 4);

    let mut decoder = Decoder::new(None, None).unwrap();
    let source = ChunkedReader::new(data, vec![1, 417, 1000, 37]);
    let bridged = bridge_to_end(&mut decoder, source).unwrap();
    assert_eq!(bridged.len(), 4 * FRAME_PCM_LEN);
    assert!(bridged == pulled);
}

#[test]
fn random_chunking_never_stalls() {
    fn prop(chunks: Vec<u16>, out_len: u16) -> TestResult {
        if out_len == 0 {
            return TestResult::discard();
        }
        let chunks = chunks.into_iter().map(|c| usize::from(c % 700)).collect();
        let source = ChunkedReader::new(silent_stream(3), chunks);

        let mut decoder = Decoder::new(None, None).unwrap();
        let mut reader = decoder
            .decoder_reader(source, 44100, 2, Encoding::Signed16)
            .unwrap();
        let mut buf = vec![0u8; usize::from(out_len)];
        let mut total = 0;
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(_) => return TestResult::failed(),
            }
        }
        TestResult::from_bool(
            total == 3 * FRAME_PCM_LEN
                && reader.is_terminated()
                && matches!(reader.read(&mut buf), Ok(0)),
        )
    }
    quickcheck(prop as fn(Vec<u16>, u16) -> TestResult);
}

#[test]
fn terminal_state_is_idempotent() {
    let mut decoder = Decoder::new(None, None).unwrap();
    let mut reader = decoder
        .decoder_reader(Cursor::new(silent_stream(1)), 44100, 2, Encoding::Signed16)
        .unwrap();
    let mut pcm = Vec::new();
    reader.read_to_end(&mut pcm).unwrap();
    assert_eq!(pcm.len(), FRAME_PCM_LEN);

    let mut buf = [0u8; 16];
    for _ in 0..3 {
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }
    reader.terminate();
    reader.terminate();
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
    drop(reader);
    assert_eq!(decoder.state(), SourceState::Closed);
}

#[test]
fn terminate_before_reading() {
    let mut decoder = Decoder::new(None, None).unwrap();
    let mut reader = decoder
        .decoder_reader(Cursor::new(silent_stream(2)), 44100, 2, Encoding::Signed16)
        .unwrap();
    reader.terminate();
    let mut buf = [0u8; 16];
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
    assert_eq!(reader.into_inner().position(), 0);
}

#[test]
fn paranoid_propagates_the_first_error() {
    let mut decoder = Decoder::new(None, None).unwrap();
    let mut reader = decoder
        .decoder_reader(FailingReader::new(), 44100, 2, Encoding::Signed16)
        .unwrap()
        .paranoid();
    let mut buf = [0u8; 256];
    let err = reader.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    assert_eq!(err.to_string(), FailingReader::MESSAGE);
    assert!(reader.is_terminated());
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
    assert_eq!(reader.into_inner().reads, 1);
}

#[test]
fn lenient_reader_gives_up_eventually() {
    let mut decoder = Decoder::new(None, None).unwrap();
    let mut reader = decoder
        .decoder_reader(FailingReader::new(), 44100, 2, Encoding::Signed16)
        .unwrap();
    let mut buf = [0u8; 256];
    let err = reader.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    assert!(reader.is_terminated());
    assert_eq!(reader.into_inner().reads, MAX_INPUT_RETRIES as usize);
}

#[test]
fn lenient_reader_retries_transient_errors() {
    let mut decoder = Decoder::new(None, None).unwrap();
    let source = FlakyReader::new(silent_stream(3), 300);
    let mut reader = decoder
        .decoder_reader(source, 44100, 2, Encoding::Signed16)
        .unwrap();
    let mut pcm = Vec::new();
    reader.read_to_end(&mut pcm).unwrap();
    assert_eq!(pcm.len(), 3 * FRAME_PCM_LEN);
    assert!(reader.into_inner().failures > 3);
}

#[test]
fn mono_reader_resamples() {
    let mut decoder = Decoder::new(None, None).unwrap();
    let mut reader = decoder
        .mono_decoder_reader(Cursor::new(tone_stream(3)), 22050, Encoding::Signed16)
        .unwrap();
    let mut pcm = Vec::new();
    reader.read_to_end(&mut pcm).unwrap();

    let frames = pcm.len() / 2;
    assert_eq!(pcm.len() % 2, 0);
    let expected = 3 * SAMPLES_PER_FRAME / 2;
    assert!(frames.abs_diff(expected) <= 2, "{frames} frames");
    assert!(s16_samples(&pcm).iter().any(|&s| s != 0));
}

fn float_stereo(data: Vec<u8>) -> Vec<f32> {
    let mut decoder = Decoder::new(None, None).unwrap();
    let mut reader = decoder
        .decoder_reader(Cursor::new(data), 44100, 2, Encoding::Float32)
        .unwrap();
    let mut pcm = Vec::new();
    reader.read_to_end(&mut pcm).unwrap();
    f32_samples(&pcm)
}

#[test]
fn mono_reader_mixes_both_channels() {
    let stereo = float_stereo(tone_stream(3));
    assert!(stereo.chunks_exact(2).any(|f| f[0] != f[1]));

    let mut decoder = Decoder::new(None, None).unwrap();
    let mut reader = decoder
        .mono_decoder_reader(Cursor::new(tone_stream(3)), 44100, Encoding::Float32)
        .unwrap();
    let mut pcm = Vec::new();
    reader.read_to_end(&mut pcm).unwrap();
    let mono = f32_samples(&pcm);

    assert_eq!(mono.len() * 2, stereo.len());
    for (i, (m, f)) in mono.iter().zip(stereo.chunks_exact(2)).enumerate() {
        assert!((m - (f[0] + f[1]) * 0.5).abs() < 1e-6, "frame {i}");
    }
}

#[test]
fn float_reader() {
    let float = float_stereo(tone_stream(2));
    assert_eq!(float.len(), 2 * SAMPLES_PER_FRAME * 2);
    assert!(float.iter().all(|s| s.abs() < 1.0));

    let mut decoder = Decoder::new(None, None).unwrap();
    let pcm = bridge_to_end(&mut decoder, Cursor::new(tone_stream(2))).unwrap();
    let int = s16_samples(&pcm);
    assert_eq!(int.len(), float.len());
    // same channel order and sample positions as the float output
    for (i, (&s, &f)) in int.iter().zip(&float).enumerate() {
        let expected = (f * 32768.0).round() as i32;
        assert!((i32::from(s) - expected).abs() <= 1, "sample {i}: {s} vs {f}");
    }
}

#[test]
fn truncated_last_frame_is_dropped() {
    let mut data = silent_stream(3);
    data.truncate(data.len() - 100);
    let mut decoder = Decoder::new(None, None).unwrap();
    let pcm = bridge_to_end(&mut decoder, Cursor::new(data)).unwrap();
    assert_eq!(pcm.len(), 2 * FRAME_PCM_LEN);
}

#[test]
fn lone_frame_after_garbage_is_decoded() {
    let mut data = vec![0x42; 30];
    data.extend(tone_frame(0));
    let mut decoder = Decoder::new(None, None).unwrap();
    let pcm = bridge_to_end(&mut decoder, ChunkedReader::new(data, vec![100])).unwrap();
    assert_eq!(pcm.len(), FRAME_PCM_LEN);
    assert_eq!(decoder.state(), SourceState::Closed);
}

#[test]
fn decoder_is_reusable_after_a_session() {
    let mut decoder = Decoder::new(None, None).unwrap();
    let first = bridge_to_end(&mut decoder, Cursor::new(silent_stream(1))).unwrap();
    let second = bridge_to_end(&mut decoder, Cursor::new(silent_stream(2))).unwrap();
    assert_eq!(first.len(), FRAME_PCM_LEN);
    assert_eq!(second.len(), 2 * FRAME_PCM_LEN);
}
