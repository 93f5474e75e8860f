//! Integration tests for movdemux-media, driven by synthetic files.

use bytes::{BufMut, BytesMut};
use movdemux_media::fixture::{nested_atoms, write_atom, write_full_atom, FixtureTrack, MovieBuilder};
use movdemux_media::{CodecId, Demuxer, Error, MediaType, PacketInfo};
use std::io::Cursor;

fn open(data: Vec<u8>) -> Demuxer<Cursor<Vec<u8>>> {
    let mut demuxer = Demuxer::from_stream(Cursor::new(data));
    demuxer.init().expect("init");
    demuxer
}

fn try_open(data: Vec<u8>) -> Result<Demuxer<Cursor<Vec<u8>>>, Error> {
    let mut demuxer = Demuxer::from_stream(Cursor::new(data));
    demuxer.init()?;
    Ok(demuxer)
}

/// Peek and read every remaining packet.
fn drain(demuxer: &mut Demuxer<Cursor<Vec<u8>>>) -> Vec<(PacketInfo, Vec<u8>)> {
    let mut packets = Vec::new();
    while let Some(info) = demuxer.peek().unwrap() {
        let packet = demuxer.read().unwrap();
        assert_eq!(packet.data.len(), info.size as usize);
        packets.push((info, packet.data.to_vec()));
    }
    packets
}

fn raw_atom(tag: &[u8; 4], body: impl FnOnce(&mut BytesMut)) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_atom(&mut buf, tag, body);
    buf.to_vec()
}

fn raw_full_atom(tag: &[u8; 4], body: impl FnOnce(&mut BytesMut)) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_full_atom(&mut buf, tag, 0, 0, body);
    buf.to_vec()
}

#[test]
fn test_two_track_round_trip() {
    let n = 64;
    let data = MovieBuilder::new()
        .track(FixtureTrack::video(b"avc1", 90_000).uniform(1, n, 3000, 0xA5))
        .track(FixtureTrack::audio(b".mp3", 44_100).uniform(1, 417, 1152, 0x5A))
        .build();
    let mut demuxer = open(data);

    let info = demuxer.media_info().unwrap();
    assert!(info.has_video);
    assert!(info.has_audio);
    assert_eq!(info.video.as_ref().unwrap().codec, CodecId::H264);
    assert_eq!(info.audio.as_ref().unwrap().codec, CodecId::Mp3);

    let video = demuxer.peek().unwrap().unwrap();
    assert_eq!(video.media_type, MediaType::Video);
    assert_eq!(video.size, n);
    assert_eq!(video.pts_us, 0);
    assert!(video.end_of_track);
    assert_eq!(demuxer.read().unwrap().data.as_ref(), vec![0xA5; n as usize].as_slice());

    let audio = demuxer.peek().unwrap().unwrap();
    assert_eq!(audio.media_type, MediaType::Audio);
    assert_eq!(audio.size, 417);
    assert_eq!(demuxer.read().unwrap().data.as_ref(), vec![0x5A; 417].as_slice());

    assert_eq!(demuxer.peek().unwrap(), None);
    assert_eq!(demuxer.peek().unwrap(), None);
}

#[test]
fn test_open_from_file_uri() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp4");
    MovieBuilder::new()
        .track(FixtureTrack::video(b"avc1", 1000).uniform(3, 10, 40, 1))
        .write_to(&path)
        .unwrap();

    let mut demuxer = Demuxer::create(&format!("file://{}", path.display())).unwrap();
    demuxer.init().unwrap();
    assert_eq!(demuxer.tracks().len(), 1);
    assert_eq!(demuxer.tracks()[0].sample_count, 3);

    let by_path = Demuxer::create(path.to_str().unwrap());
    assert!(by_path.is_ok());
}

#[test]
fn test_nesting_deeper_than_limit_fails_init() {
    let shallow = MovieBuilder::new()
        .track(FixtureTrack::video(b"avc1", 1000).uniform(1, 4, 40, 0))
        .moov_atom(nested_atoms(b"udta", 5))
        .build();
    assert!(try_open(shallow).is_ok());

    let deep = MovieBuilder::new()
        .track(FixtureTrack::video(b"avc1", 1000).uniform(1, 4, 40, 0))
        .moov_atom(nested_atoms(b"udta", 15))
        .build();
    assert!(matches!(try_open(deep), Err(Error::AtomTooDeep { max: 10, .. })));
}

#[test]
fn test_zero_count_chunk_run_is_repaired() {
    // trailing run with count 0 past the last chunk
    let data = MovieBuilder::new()
        .track(
            FixtureTrack::video(b"avc1", 1000)
                .durations(vec![(3, 10)])
                .chunk_runs(vec![(1, 1, 1), (4, 0, 1)])
                .fixed_size(8, 3)
                .chunk(vec![1; 8])
                .chunk(vec![2; 8])
                .chunk(vec![3; 8]),
        )
        .build();
    let mut demuxer = open(data);
    let packets = drain(&mut demuxer);
    assert_eq!(packets.len(), 3);
    assert_eq!(packets[2].1, vec![3; 8]);

    // single run with count 0 is raised to 1
    let data = MovieBuilder::new()
        .track(
            FixtureTrack::video(b"avc1", 1000)
                .durations(vec![(2, 10)])
                .chunk_runs(vec![(1, 0, 1)])
                .fixed_size(4, 2)
                .chunk(vec![7; 4])
                .chunk(vec![9; 4]),
        )
        .build();
    let mut demuxer = open(data);
    let packets = drain(&mut demuxer);
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[1].1, vec![9; 4]);
}

#[test]
fn test_negative_durations_keep_decode_order() {
    let data = MovieBuilder::new()
        .track(
            FixtureTrack::video(b"avc1", 1000)
                .durations(vec![(4, 100), (1, -250), (5, 100)])
                .chunk_runs(vec![(1, 10, 1)])
                .fixed_size(1, 10)
                .chunk((0u8..10).collect()),
        )
        .build();
    let mut demuxer = open(data);

    let dts: Vec<i64> = drain(&mut demuxer).iter().map(|(info, _)| info.dts_us / 1000).collect();
    assert_eq!(dts, vec![0, 100, 200, 300, 400, 401, 402, 403, 450, 550]);
}

#[test]
fn test_index_matches_sample_count_and_is_monotonic() {
    let data = MovieBuilder::new()
        .track(
            FixtureTrack::video(b"avc1", 30_000)
                .durations(vec![(2, 1001), (1, 0), (3, 1001)])
                .chunk_runs(vec![(1, 2, 1), (2, 4, 1)])
                .sizes(vec![10, 3, 3, 4, 5, 6])
                .sync_samples(vec![1, 4])
                .chunk(vec![0; 13])
                .chunk(vec![0; 18]),
        )
        .track(FixtureTrack::audio(b"mp4a", 48_000).uniform(8, 6, 1024, 0))
        .build();
    let demuxer = open(data);

    for track in demuxer.tracks() {
        let entries = &track.samples().entries;
        assert_eq!(entries.len(), track.sample_count as usize);
        for pair in entries.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }
    let video = &demuxer.tracks()[0];
    let syncs: Vec<usize> = video.samples().sync_positions().collect();
    assert_eq!(syncs, vec![0, 3]);
}

#[test]
fn test_packets_interleave_by_decode_time() {
    let data = MovieBuilder::new()
        .track(FixtureTrack::video(b"avc1", 90_000).uniform(5, 20, 3600, 1))
        .track(FixtureTrack::audio(b"mp4a", 48_000).uniform(9, 8, 1024, 2))
        .build();
    let mut demuxer = open(data);

    let packets = drain(&mut demuxer);
    assert_eq!(packets.len(), 14);
    for pair in packets.windows(2) {
        assert!(pair[0].0.dts_us <= pair[1].0.dts_us);
    }
    // end_of_track is set exactly once per track
    let ends: Vec<usize> = packets
        .iter()
        .filter(|(info, _)| info.end_of_track)
        .map(|(info, _)| info.track)
        .collect();
    assert_eq!(ends.len(), 2);
}

#[test]
fn test_seek_lands_video_on_sync_and_aligns_audio() {
    let data = MovieBuilder::new()
        .track(
            FixtureTrack::video(b"avc1", 1000)
                .uniform(10, 4, 100, 0)
                .sync_samples(vec![1, 6]),
        )
        .track(FixtureTrack::audio(b"mp4a", 1000).uniform(40, 4, 25, 0))
        .build();
    let mut demuxer = open(data);

    let outcome = demuxer.seek(420_000).unwrap();
    assert_eq!(outcome.video, Some((0, 5)));
    assert_eq!(outcome.audio, Some((1, 20)));

    let next = demuxer.peek().unwrap().unwrap();
    assert_eq!(next.track, 0);
    assert_eq!(next.dts_us, 500_000);
    assert!(next.sync);
    let next = demuxer.peek().unwrap().unwrap();
    assert_eq!((next.track, next.dts_us), (1, 500_000));
}

#[test]
fn test_seek_intra_only_video_picks_closest_sample() {
    let data = MovieBuilder::new()
        .track(
            FixtureTrack::video(b"jpeg", 1000)
                .uniform(10, 4, 100, 0)
                .sync_samples(vec![1]),
        )
        .build();
    let mut demuxer = open(data);
    assert_eq!(demuxer.tracks()[0].codec, CodecId::Mjpeg);

    demuxer.seek(380_000).unwrap();
    assert_eq!(demuxer.peek().unwrap().unwrap().dts_us, 400_000);
}

#[test]
fn test_seek_past_end_then_read_to_end() {
    let data = MovieBuilder::new()
        .track(FixtureTrack::video(b"avc1", 1000).uniform(4, 4, 100, 0))
        .build();
    let mut demuxer = open(data);
    demuxer.seek(60_000_000).unwrap();
    let packets = drain(&mut demuxer);
    assert_eq!(packets.len(), 1);
    assert!(packets[0].0.end_of_track);
    assert_eq!(demuxer.peek().unwrap(), None);
}

#[test]
fn test_composition_offsets_shift_pts() {
    let data = MovieBuilder::new()
        .track(
            FixtureTrack::video(b"avc1", 1000)
                .uniform(4, 2, 100, 0)
                .composition(vec![(1, 200), (1, -100), (1, 0), (1, 100)]),
        )
        .build();
    let mut demuxer = open(data);

    let pts: Vec<i64> = drain(&mut demuxer).iter().map(|(info, _)| info.pts_us / 1000).collect();
    assert_eq!(pts, vec![300, 100, 300, 500]);
}

#[test]
fn test_uncompressed_pcm_is_batched() {
    let data = MovieBuilder::new()
        .brand(b"qt  ")
        .track(
            FixtureTrack::audio(b"twos", 8000)
                .audio_format(2, 16, 8000)
                .durations(vec![(3000, 1)])
                .chunk_runs(vec![(1, 1500, 1)])
                .fixed_size(1, 3000)
                .chunk(vec![1; 6000])
                .chunk(vec![2; 6000]),
        )
        .build();
    let mut demuxer = open(data);
    assert_eq!(demuxer.tracks()[0].codec, CodecId::PcmS16Be);
    assert!(!demuxer.movie().isom);

    let packets = drain(&mut demuxer);
    let sizes: Vec<u32> = packets.iter().map(|(info, _)| info.size).collect();
    assert_eq!(sizes, vec![4096, 1904, 4096, 1904]);
    let dts: Vec<i64> = packets.iter().map(|(info, _)| info.dts_us).collect();
    assert_eq!(dts, vec![0, 128_000, 187_500, 315_500]);
    assert!(packets[2].1.iter().all(|&b| b == 2));
}

#[test]
fn test_esds_sets_codec_and_extra_data() {
    let data = MovieBuilder::new()
        .track(
            FixtureTrack::audio(b"mp4a", 44_100)
                .uniform(2, 10, 1024, 0)
                .esds(0x40, vec![0x12, 0x10]),
        )
        .build();
    let mut demuxer = open(data);

    let info = demuxer.media_info().unwrap();
    let audio = info.audio.unwrap();
    assert_eq!(audio.codec, CodecId::Aac);
    assert_eq!(audio.channels, 2);
    assert_eq!(audio.sample_rate, 44_100);
    assert_eq!(audio.extra_data.as_deref(), Some(&[0x12, 0x10][..]));
}

#[test]
fn test_compact_sizes_and_wide_offsets() {
    let data = MovieBuilder::new()
        .track(
            FixtureTrack::video(b"hvc1", 1000)
                .durations(vec![(3, 40)])
                .chunk_runs(vec![(1, 3, 1)])
                .compact_sizes(16, vec![3, 5, 7])
                .wide_offsets()
                .chunk((0u8..15).collect()),
        )
        .track(
            FixtureTrack::audio(b"mp4a", 1000)
                .durations(vec![(3, 40)])
                .chunk_runs(vec![(1, 3, 1)])
                .compact_sizes(4, vec![1, 2, 3])
                .chunk(vec![9; 6]),
        )
        .build();
    let mut demuxer = open(data);
    assert_eq!(demuxer.tracks()[0].codec, CodecId::Hevc);

    let packets = drain(&mut demuxer);
    let video: Vec<&Vec<u8>> = packets.iter().filter(|(i, _)| i.track == 0).map(|(_, d)| d).collect();
    assert_eq!(video[1], &vec![3, 4, 5, 6, 7]);
    let audio_sizes: Vec<u32> = packets
        .iter()
        .filter(|(i, _)| i.track == 1)
        .map(|(i, _)| i.size)
        .collect();
    assert_eq!(audio_sizes, vec![1, 2, 3]);
}

#[test]
fn test_duplicate_table_last_wins() {
    let second_stts = raw_full_atom(b"stts", |b| {
        b.put_u32(1);
        b.put_u32(2);
        b.put_u32(500);
    });
    let data = MovieBuilder::new()
        .track(
            FixtureTrack::video(b"avc1", 1000)
                .uniform(2, 4, 100, 0)
                .stbl_atom(second_stts),
        )
        .build();
    let mut demuxer = open(data);
    let dts: Vec<i64> = drain(&mut demuxer).iter().map(|(i, _)| i.dts_us).collect();
    assert_eq!(dts, vec![0, 500_000]);
}

#[test]
fn test_chunk_offset_near_end_of_address_space_leaves_track_empty() {
    let co64 = raw_full_atom(b"co64", |b| {
        b.put_u32(1);
        b.put_u64(u64::MAX - 10);
    });
    let data = MovieBuilder::new()
        .track(
            FixtureTrack::video(b"avc1", 1000)
                .uniform(2, 100, 40, 0)
                .stbl_atom(co64),
        )
        .track(FixtureTrack::audio(b"mp4a", 1000).uniform(1, 4, 40, 7))
        .build();
    let mut demuxer = open(data);

    assert!(demuxer.tracks()[0].samples().is_empty());
    assert_eq!(demuxer.tracks()[0].sample_count, 0);
    let packets = drain(&mut demuxer);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].0.track, 1);
}

#[test]
fn test_duplicate_media_header_fails_init() {
    let mdhd = raw_full_atom(b"mdhd", |b| {
        b.put_u32(0);
        b.put_u32(0);
        b.put_u32(1000);
        b.put_u32(0);
        b.put_u32(0);
    });
    let data = MovieBuilder::new()
        .track(FixtureTrack::video(b"avc1", 1000).uniform(1, 4, 40, 0).mdia_atom(mdhd))
        .build();
    assert!(matches!(try_open(data), Err(Error::DuplicateAtom("mdhd"))));
}

#[test]
fn test_duplicate_sample_description_fails_init() {
    let stsd = raw_full_atom(b"stsd", |b| {
        b.put_u32(1);
        write_atom(b, b"avc1", |b| b.put_bytes(0, 8));
    });
    let data = MovieBuilder::new()
        .track(
            FixtureTrack::video(b"avc1", 1000)
                .uniform(1, 4, 40, 0)
                .codec_config(b"avcC", vec![1, 2, 3])
                .stbl_atom(stsd),
        )
        .build();
    assert!(matches!(try_open(data), Err(Error::DuplicateAtom("stsd"))));
}

#[test]
fn test_oversized_table_fails_init() {
    let stsc = raw_full_atom(b"stsc", |b| {
        b.put_u32(1000);
        b.put_u32(1);
        b.put_u32(1);
        b.put_u32(1);
    });
    let data = MovieBuilder::new()
        .track(FixtureTrack::video(b"avc1", 1000).uniform(1, 4, 40, 0).stbl_atom(stsc))
        .build();
    assert!(matches!(try_open(data), Err(Error::InvalidMp4(_))));
}

#[test]
fn test_moov_after_mdat() {
    let data = MovieBuilder::new()
        .mdat_first()
        .track(FixtureTrack::video(b"avc1", 1000).uniform(2, 6, 40, 0xEE))
        .build();
    let mut demuxer = open(data);
    assert!(demuxer.movie().found_mdat);
    let packets = drain(&mut demuxer);
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[1].1, vec![0xEE; 6]);
}

#[test]
fn test_track_without_tables_is_empty_not_fatal() {
    let data = MovieBuilder::new()
        .track(FixtureTrack::video(b"avc1", 1000).durations(vec![(1, 10)]))
        .track(FixtureTrack::audio(b"mp4a", 1000).uniform(1, 4, 10, 4))
        .build();
    let mut demuxer = open(data);

    assert!(demuxer.tracks()[0].samples().is_empty());
    let packets = drain(&mut demuxer);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].0.track, 1);
}

#[test]
fn test_unknown_atoms_are_skipped() {
    let free = raw_atom(b"free", |b| b.put_bytes(0xFF, 40));
    let data = MovieBuilder::new()
        .track(FixtureTrack::other(b"text", b"tx3g", 1000).uniform(1, 2, 10, 0))
        .track(FixtureTrack::video(b"avc1", 1000).uniform(1, 2, 10, 0).stbl_atom(free.clone()))
        .moov_atom(free)
        .build();
    let mut demuxer = open(data);

    assert_eq!(demuxer.tracks()[0].media_type, MediaType::Other);
    let info = demuxer.media_info().unwrap();
    assert!(info.has_video);
    assert!(!info.has_audio);
    assert_eq!(info.video.unwrap().track, 1);
}
