/// Integration tests for the video decoder
///
/// These need an `ffmpeg` binary on PATH to produce the input clip.
/// Run manually: cargo test --package surgery-seg-decoder --test integration_test -- --ignored
use surgery_seg_common::{ChannelOrder, Frame, FrameSink, FrameSource};
use surgery_seg_decoder::VideoFileSource;
use surgery_seg_encoder::{EncoderConfig, VideoCodec, VideoFileSink};

fn write_clip(path: &std::path::Path, frames: u32) {
    let config = EncoderConfig {
        width: 320,
        height: 256,
        fps: 6.0,
        codec: VideoCodec::H264,
        crf: Some(0),
    };
    let mut sink = VideoFileSink::create(path, config).expect("Failed to start encoder");
    for i in 0..frames {
        let frame = Frame::filled(320, 256, ChannelOrder::Bgr, [0, (i * 40) as u8, 200]);
        sink.write_frame(&frame).expect("Failed to write frame");
    }
    sink.close().expect("Failed to finalize clip");
}

#[test]
#[ignore]
fn test_decode_encoded_clip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp4");
    write_clip(&path, 5);

    let mut source = VideoFileSource::open(&path).expect("Failed to open clip");
    assert_eq!(source.info().width, 320);
    assert_eq!(source.info().height, 256);
    assert_eq!(source.total_count(), 5);

    let mut count = 0;
    while let Some(frame) = source.next_frame().expect("Decode failed") {
        assert_eq!(frame.channel_order(), ChannelOrder::Bgr);
        assert_eq!(frame.width(), 320);
        assert_eq!(frame.height(), 256);
        // Lossy chroma subsampling keeps red dominant but not exact
        let [b, _, r] = frame.pixel(160, 128);
        assert!(r > 150 && b < 60, "unexpected pixel {b} {r}");
        count += 1;
    }
    assert_eq!(count, 5);

    // End of stream is sticky
    assert!(source.next_frame().unwrap().is_none());
}
