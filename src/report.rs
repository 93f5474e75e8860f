//! Text and JSON renderings of demuxer output.

use anyhow::{Context, Result};
use movdemux_media::demux::TrackSummary;
use movdemux_media::{Demuxer, MediaInfo, MediaStream, MediaType, PacketInfo};
use serde::Serialize;
use std::fmt;

/// Everything `movdemux info` prints.
#[derive(Debug, Serialize)]
pub struct InfoReport {
    /// Major brand is not QuickTime.
    pub isom: bool,
    pub info: MediaInfo,
    pub tracks: Vec<TrackSummary>,
}

impl InfoReport {
    pub fn collect<R: MediaStream>(demuxer: &mut Demuxer<R>) -> Result<Self> {
        let info = demuxer.media_info().context("Failed to read media info")?;
        Ok(Self {
            isom: demuxer.movie().isom,
            info,
            tracks: demuxer.tracks().iter().map(TrackSummary::from).collect(),
        })
    }
}

impl fmt::Display for InfoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let brand = if self.isom { "ISO base media" } else { "QuickTime" };
        writeln!(f, "Brand: {}", brand)?;
        writeln!(f, "Size: {} bytes", self.info.file_size)?;
        writeln!(f, "Duration: {}", format_duration(self.info.duration_us))?;
        writeln!(f, "Seekable: {}", if self.info.seekable { "yes" } else { "no" })?;

        if let Some(video) = &self.info.video {
            writeln!(
                f,
                "Video: {} {}x{} (track {})",
                video.codec, video.width, video.height, video.track
            )?;
        }
        if let Some(audio) = &self.info.audio {
            writeln!(
                f,
                "Audio: {} {}ch {} Hz {} bit (track {})",
                audio.codec, audio.channels, audio.sample_rate, audio.bits_per_sample, audio.track
            )?;
        }

        writeln!(f, "\nTracks: {}", self.tracks.len())?;
        for track in &self.tracks {
            write!(
                f,
                "  [{}] {} {} '{}' id {}, {} samples, timescale {}, {}",
                track.index,
                media_label(track.media_type),
                track.codec,
                track.codec_tag,
                track.id,
                track.samples,
                track.time_scale,
                format_duration(track.duration_us)
            )?;
            if track.extra_data_len > 0 {
                write!(f, ", {} bytes codec config", track.extra_data_len)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Packets listed by `movdemux packets`.
#[derive(Debug, Default, Serialize)]
pub struct PacketReport {
    pub packets: Vec<PacketInfo>,
    pub total_bytes: u64,
}

/// Peek and read packets until end of stream or `limit`.
pub fn collect_packets<R: MediaStream>(
    demuxer: &mut Demuxer<R>,
    limit: Option<usize>,
) -> Result<PacketReport> {
    let mut report = PacketReport::default();

    while limit.map_or(true, |max| report.packets.len() < max) {
        let Some(info) = demuxer.peek()? else {
            break;
        };
        let packet = demuxer
            .read()
            .with_context(|| format!("Failed to read packet at offset {}", info.offset))?;
        report.total_bytes += packet.data.len() as u64;
        report.packets.push(info);
    }

    tracing::debug!(
        packets = report.packets.len(),
        bytes = report.total_bytes,
        "packet listing done"
    );
    Ok(report)
}

impl fmt::Display for PacketReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>5} {:>8} {:>12} {:>12} {:>8} {:>12} flags",
            "track", "sample", "dts_ms", "pts_ms", "size", "offset"
        )?;
        for p in &self.packets {
            let mut flags = String::new();
            if p.sync {
                flags.push('K');
            }
            if p.end_of_track {
                flags.push('E');
            }
            writeln!(
                f,
                "{:>5} {:>8} {:>12.3} {:>12.3} {:>8} {:>12} {}",
                p.track,
                p.sample,
                p.dts_us as f64 / 1000.0,
                p.pts_us as f64 / 1000.0,
                p.size,
                p.offset,
                flags
            )?;
        }
        writeln!(
            f,
            "\n{} packets, {} bytes",
            self.packets.len(),
            self.total_bytes
        )
    }
}

fn media_label(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Video => "video",
        MediaType::Audio => "audio",
        MediaType::Other => "other",
    }
}

/// `HH:MM:SS.mmm`, negative values shown as zero.
pub fn format_duration(us: i64) -> String {
    let ms = us.max(0) / 1000;
    let secs = ms / 1000;
    let mins = secs / 60;
    let hours = mins / 60;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        hours,
        mins % 60,
        secs % 60,
        ms % 1000
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use movdemux_media::fixture::{FixtureTrack, MovieBuilder};
    use std::io::Cursor;

    fn demuxer() -> Demuxer<Cursor<Vec<u8>>> {
        let data = MovieBuilder::new()
            .track(
                FixtureTrack::video(b"avc1", 1000)
                    .uniform(3, 10, 40, 0)
                    .codec_config(b"avcC", vec![1, 2, 3, 4]),
            )
            .track(FixtureTrack::audio(b"mp4a", 48_000).uniform(4, 6, 1024, 0))
            .build();
        let mut demuxer = Demuxer::from_stream(Cursor::new(data));
        demuxer.init().unwrap();
        demuxer
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00:00.000");
        assert_eq!(format_duration(3_723_456_000), "01:02:03.456");
        assert_eq!(format_duration(-5), "00:00:00.000");
    }

    #[test]
    fn test_info_report_text() {
        let report = InfoReport::collect(&mut demuxer()).unwrap();
        let text = report.to_string();

        assert!(text.contains("Brand: ISO base media"));
        assert!(text.contains("Video: h264 320x240 (track 0)"));
        assert!(text.contains("Audio: aac 2ch 48000 Hz 16 bit (track 1)"));
        assert!(text.contains("[0] video h264 'avc1' id 1, 3 samples"));
        assert!(text.contains("4 bytes codec config"));
    }

    #[test]
    fn test_info_report_json() {
        let report = InfoReport::collect(&mut demuxer()).unwrap();
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();

        assert_eq!(json["info"]["has_video"], true);
        assert_eq!(json["tracks"].as_array().unwrap().len(), 2);
        assert_eq!(json["tracks"][1]["samples"], 4);
    }

    #[test]
    fn test_collect_packets_respects_limit() {
        let mut demuxer = demuxer();
        let report = collect_packets(&mut demuxer, Some(3)).unwrap();
        assert_eq!(report.packets.len(), 3);

        let rest = collect_packets(&mut demuxer, None).unwrap();
        assert_eq!(rest.packets.len(), 4);
        assert_eq!(report.total_bytes + rest.total_bytes, 3 * 10 + 4 * 6);
    }

    #[test]
    fn test_packet_report_text() {
        let report = collect_packets(&mut demuxer(), Some(1)).unwrap();
        let text = report.to_string();
        assert!(text.starts_with("track"));
        assert!(text.contains("1 packets, 10 bytes"));
    }
}
