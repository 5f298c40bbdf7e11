//! rsmpeg-backed [`MediaOpener`] and [`Muxer`].

use std::collections::VecDeque;
use std::ffi::CString;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clipweave_core::media::MediaAsset;
use clipweave_core::pipeline::FrameBuffer;
use clipweave_core::settings::ExportFormat;
use rsmpeg::avcodec::{AVCodec, AVCodecContext};
use rsmpeg::avformat::{AVFormatContextInput, AVFormatContextOutput};
use rsmpeg::avutil::{AVChannelLayout, AVFrame};
use rsmpeg::ffi;
use rsmpeg::swresample::SwrContext;
use rsmpeg::swscale::SwsContext;
use tempfile::TempDir;
use tracing::debug;

use crate::audio::AudioBlock;
use crate::decoder::{AudioBlocks, AudioConfig, MediaOpener, MediaSource, SourceInfo, VideoFrame, VideoFrames};
use crate::encoder::{AudioTrackConfig, Muxer, VideoTrackConfig};
use crate::error::{MediaError, Result};

fn open_input(path: &Path) -> Result<AVFormatContextInput> {
    let path_str = path.to_string_lossy().to_string();
    let c_path = CString::new(path_str.clone()).map_err(|_| MediaError::OpenFailed(path_str.clone()))?;
    AVFormatContextInput::open(&c_path).map_err(|e| MediaError::OpenFailed(format!("{path_str}: {e}")))
}

fn find_stream(input_ctx: &AVFormatContextInput, kind: ffi::AVMediaType) -> Option<(usize, AVCodec)> {
    input_ctx.streams().iter().enumerate().find_map(|(i, stream)| {
        let codecpar = stream.codecpar();
        if codecpar.codec_type == kind {
            AVCodec::find_decoder(codecpar.codec_id).map(|decoder| (i, decoder))
        } else {
            None
        }
    })
}

fn open_decoder(input_ctx: &AVFormatContextInput, index: usize, decoder: &AVCodec) -> Result<AVCodecContext> {
    let mut decode_ctx = AVCodecContext::new(decoder);
    {
        let streams = input_ctx.streams();
        decode_ctx
            .apply_codecpar(&streams[index].codecpar())
            .map_err(|e| MediaError::DecoderError(format!("apply_codecpar: {e}")))?;
    }
    // 0 = auto-detect thread count.
    unsafe {
        use rsmpeg::UnsafeDerefMut;
        decode_ctx.deref_mut().thread_count = 0;
    }
    decode_ctx
        .open(None)
        .map_err(|e| MediaError::DecoderError(format!("open: {e}")))?;
    Ok(decode_ctx)
}

fn pts_to_duration(pts: i64, tb: ffi::AVRational) -> Duration {
    if pts == ffi::AV_NOPTS_VALUE || tb.den == 0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(pts as f64 * tb.num as f64 / tb.den as f64).unwrap_or(Duration::ZERO)
}

/// Packet/frame pump shared by the video and audio readers.
struct StreamDecoder {
    input_ctx: AVFormatContextInput,
    decode_ctx: AVCodecContext,
    stream_index: usize,
    time_base: ffi::AVRational,
    flushed: bool,
}

impl StreamDecoder {
    fn open(path: &Path, kind: ffi::AVMediaType) -> Result<Self> {
        let input_ctx = open_input(path)?;
        let (stream_index, decoder) = find_stream(&input_ctx, kind).ok_or(if kind == ffi::AVMEDIA_TYPE_VIDEO {
            MediaError::NoVideoStream
        } else {
            MediaError::NoAudioStream
        })?;

        // Let the demuxer drop packets of other streams instead of handing
        // them to us one by one.
        let nb_streams = input_ctx.streams().len();
        for i in (0..nb_streams).filter(|i| *i != stream_index) {
            unsafe {
                let streams = input_ctx.streams();
                let stream_ptr = streams[i].as_ptr() as *mut ffi::AVStream;
                (*stream_ptr).discard = ffi::AVDISCARD_ALL;
            }
        }

        let decode_ctx = open_decoder(&input_ctx, stream_index, &decoder)?;
        let time_base = input_ctx.streams()[stream_index].time_base;
        Ok(Self {
            input_ctx,
            decode_ctx,
            stream_index,
            time_base,
            flushed: false,
        })
    }

    fn seek_to(&mut self, at: Duration) -> Result<()> {
        if at.is_zero() {
            return Ok(());
        }
        let tb = self.time_base;
        let ts = (at.as_secs_f64() * tb.den as f64 / tb.num.max(1) as f64) as i64;
        self.input_ctx
            .seek(self.stream_index as i32, ts, ffi::AVSEEK_FLAG_BACKWARD as i32)
            .map_err(|e| MediaError::SeekError(format!("{e}")))?;
        self.decode_ctx.flush_buffers();
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<AVFrame>> {
        loop {
            if let Ok(frame) = self.decode_ctx.receive_frame() {
                return Ok(Some(frame));
            }
            if self.flushed {
                return Ok(None);
            }
            match self.input_ctx.read_packet() {
                Ok(Some(packet)) => {
                    if packet.stream_index as usize != self.stream_index {
                        continue;
                    }
                    self.decode_ctx
                        .send_packet(Some(&packet))
                        .map_err(|e| MediaError::DecoderError(format!("send_packet: {e}")))?;
                }
                Ok(None) => {
                    self.decode_ctx.send_packet(None).ok();
                    self.flushed = true;
                }
                Err(e) => return Err(MediaError::DecoderError(format!("read_packet: {e}"))),
            }
        }
    }

    fn timestamp(&self, frame: &AVFrame) -> Duration {
        pts_to_duration(frame.pts, self.time_base)
    }
}

/// Copy a packed 4-byte-per-pixel plane out of an AVFrame, honoring its stride.
fn packed_rgba(frame: &AVFrame, width: u32, height: u32) -> Result<FrameBuffer> {
    let linesize = frame.linesize[0] as usize;
    let row = width as usize * 4;
    let mut data = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let bytes = unsafe { std::slice::from_raw_parts(frame.data[0].add(y * linesize), row) };
        data.extend_from_slice(bytes);
    }
    FrameBuffer::from_rgba_vec(width, height, data).map_err(|e| MediaError::DecoderError(e.to_string()))
}

struct FfmpegFrames {
    decoder: StreamDecoder,
    sws_ctx: Option<SwsContext>,
    start: Duration,
    end: Duration,
    /// Last frame decoded before `start`.
    held: Option<AVFrame>,
    queued: VecDeque<VideoFrame>,
    done: bool,
}

impl FfmpegFrames {
    fn to_rgba(&mut self, frame: &AVFrame) -> Result<VideoFrame> {
        let (w, h) = (frame.width, frame.height);
        if self.sws_ctx.is_none() {
            self.sws_ctx = Some(
                SwsContext::get_context(
                    w,
                    h,
                    frame.format,
                    w,
                    h,
                    ffi::AV_PIX_FMT_RGBA,
                    ffi::SWS_BILINEAR,
                    None,
                    None,
                    None,
                )
                .ok_or_else(|| MediaError::DecoderError("failed to create sws context".into()))?,
            );
        }
        let mut dst = AVFrame::new();
        dst.set_width(w);
        dst.set_height(h);
        dst.set_format(ffi::AV_PIX_FMT_RGBA);
        dst.alloc_buffer()
            .map_err(|e| MediaError::DecoderError(format!("alloc_buffer: {e}")))?;
        if let Some(sws) = self.sws_ctx.as_mut() {
            sws.scale_frame(frame, 0, h, &mut dst)
                .map_err(|e| MediaError::DecoderError(format!("scale_frame: {e}")))?;
        }
        let image = packed_rgba(&dst, w as u32, h as u32)?;
        Ok(VideoFrame::new(image, self.decoder.timestamp(frame)))
    }

    fn advance(&mut self) -> Result<Option<VideoFrame>> {
        if let Some(frame) = self.queued.pop_front() {
            return Ok(Some(frame));
        }
        if self.done {
            return Ok(None);
        }
        loop {
            let Some(raw) = self.decoder.next_frame()? else {
                self.done = true;
                return self.flush_held();
            };
            let ts = self.decoder.timestamp(&raw);
            if ts >= self.end {
                self.done = true;
                return self.flush_held();
            }
            if ts < self.start {
                self.held = Some(raw);
                continue;
            }
            let frame = self.to_rgba(&raw)?;
            if let Some(held) = self.held.take() {
                self.queued.push_back(frame);
                return self.to_rgba(&held).map(Some);
            }
            return Ok(Some(frame));
        }
    }

    fn flush_held(&mut self) -> Result<Option<VideoFrame>> {
        match self.held.take() {
            Some(held) => self.to_rgba(&held).map(Some),
            None => Ok(None),
        }
    }
}

impl Iterator for FfmpegFrames {
    type Item = Result<VideoFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(frame) => frame.map(Ok),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

struct FfmpegBlocks {
    decoder: StreamDecoder,
    swr_ctx: SwrContext,
    sample_rate: u32,
    channels: u16,
    start: Duration,
    end: Duration,
    done: bool,
}

impl FfmpegBlocks {
    fn open(path: &Path, range: Range<Duration>) -> Result<Self> {
        let mut decoder = StreamDecoder::open(path, ffi::AVMEDIA_TYPE_AUDIO)?;
        let in_sample_rate = decoder.decode_ctx.sample_rate;
        let in_sample_fmt = decoder.decode_ctx.sample_fmt;
        let in_ch_layout = unsafe { rsmpeg::avutil::AVChannelLayoutRef::new(&decoder.decode_ctx.ch_layout) };
        let channels = in_ch_layout.nb_channels as u16;

        // Native rate and channel count, interleaved f32.
        let out_ch_layout = AVChannelLayout::from_nb_channels(channels as i32);
        let mut swr_ctx = SwrContext::new(
            &out_ch_layout,
            ffi::AV_SAMPLE_FMT_FLT,
            in_sample_rate,
            &in_ch_layout,
            in_sample_fmt,
            in_sample_rate,
        )
        .map_err(|e| MediaError::DecoderError(format!("swr_alloc_set_opts2: {e}")))?;
        swr_ctx
            .init()
            .map_err(|e| MediaError::DecoderError(format!("swr_init: {e}")))?;

        decoder.seek_to(range.start)?;
        Ok(Self {
            decoder,
            swr_ctx,
            sample_rate: in_sample_rate as u32,
            channels,
            start: range.start,
            end: range.end,
            done: false,
        })
    }

    fn convert(&mut self, frame: &AVFrame) -> Result<AudioBlock> {
        let mut dst = AVFrame::new();
        dst.set_format(ffi::AV_SAMPLE_FMT_FLT);
        dst.set_sample_rate(self.sample_rate as i32);
        let out_ch_layout = AVChannelLayout::from_nb_channels(self.channels as i32);
        unsafe {
            ffi::av_channel_layout_copy(&mut (*dst.as_mut_ptr()).ch_layout, out_ch_layout.as_ptr());
        }
        dst.set_nb_samples(frame.nb_samples);
        dst.alloc_buffer()
            .map_err(|e| MediaError::DecoderError(format!("alloc_buffer: {e}")))?;
        self.swr_ctx
            .convert_frame(Some(frame), &mut dst)
            .map_err(|e| MediaError::DecoderError(format!("convert_frame: {e}")))?;

        let total = dst.nb_samples as usize * self.channels as usize;
        let samples = unsafe { std::slice::from_raw_parts(dst.data[0] as *const f32, total) };
        Ok(AudioBlock::from_f32_interleaved(
            self.decoder.timestamp(frame),
            self.sample_rate,
            self.channels,
            samples,
        ))
    }

    fn advance(&mut self) -> Result<Option<AudioBlock>> {
        loop {
            let Some(raw) = self.decoder.next_frame()? else {
                return Ok(None);
            };
            let block = self.convert(&raw)?;
            if block.timestamp >= self.end {
                return Ok(None);
            }
            if block.timestamp + block.duration() <= self.start {
                continue;
            }
            return Ok(Some(block));
        }
    }
}

impl Iterator for FfmpegBlocks {
    type Item = Result<AudioBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(block)) => Some(Ok(block)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// A media file on disk.
pub struct FfmpegSource {
    path: PathBuf,
}

impl FfmpegSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MediaSource for FfmpegSource {
    fn probe(&self) -> Result<SourceInfo> {
        let input_ctx = open_input(&self.path)?;
        let mut info = SourceInfo {
            duration: Duration::try_from_secs_f64(input_ctx.duration as f64 / ffi::AV_TIME_BASE as f64)
                .unwrap_or(Duration::ZERO),
            dimensions: None,
            fps: None,
            audio: None,
            codec_name: String::new(),
        };
        for stream in input_ctx.streams().iter() {
            let codecpar = stream.codecpar();
            if codecpar.codec_type == ffi::AVMEDIA_TYPE_VIDEO && info.dimensions.is_none() {
                info.dimensions = Some((codecpar.width as u32, codecpar.height as u32));
                let r = stream.r_frame_rate;
                if r.den > 0 {
                    info.fps = Some(r.num as f64 / r.den as f64);
                }
                if let Some(decoder) = AVCodec::find_decoder(codecpar.codec_id) {
                    info.codec_name = decoder.name().to_string_lossy().to_string();
                }
            } else if codecpar.codec_type == ffi::AVMEDIA_TYPE_AUDIO && info.audio.is_none() {
                info.audio = Some(AudioConfig {
                    sample_rate: codecpar.sample_rate as u32,
                    channels: codecpar.ch_layout.nb_channels as u16,
                });
            }
        }
        Ok(info)
    }

    fn video_frames(&mut self, range: Range<Duration>) -> Result<VideoFrames> {
        let mut decoder = StreamDecoder::open(&self.path, ffi::AVMEDIA_TYPE_VIDEO)?;
        decoder.seek_to(range.start)?;
        Ok(Box::new(FfmpegFrames {
            decoder,
            sws_ctx: None,
            start: range.start,
            end: range.end,
            held: None,
            queued: VecDeque::new(),
            done: false,
        }))
    }

    fn audio_blocks(&mut self, range: Range<Duration>) -> Result<AudioBlocks> {
        Ok(Box::new(FfmpegBlocks::open(&self.path, range)?))
    }
}

/// Opens assets whose `source` is a local file path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegOpener;

impl MediaOpener for FfmpegOpener {
    fn open(&self, asset: &MediaAsset) -> Result<Box<dyn MediaSource>> {
        if !asset.source.exists() {
            return Err(MediaError::OpenFailed(asset.source.display().to_string()));
        }
        Ok(Box::new(FfmpegSource::new(asset.source.clone())))
    }
}

// =============================================================================
// Muxer
// =============================================================================

fn encoder_name(codec: &str) -> Result<&'static std::ffi::CStr> {
    match codec {
        "h264" => Ok(c"libx264"),
        "vp9" => Ok(c"libvpx-vp9"),
        "aac" => Ok(c"aac"),
        "opus" => Ok(c"libopus"),
        other => Err(MediaError::Encoder(format!("no encoder for codec {other}"))),
    }
}

struct VideoEncoder {
    ctx: AVCodecContext,
    sws_ctx: Option<SwsContext>,
    stream_index: i32,
    fps: u32,
    width: i32,
    height: i32,
}

struct AudioEncoder {
    ctx: AVCodecContext,
    stream_index: i32,
    frame_size: usize,
    channels: usize,
    sample_rate: i32,
    fifo: Vec<f32>,
    next_pts: i64,
}

/// Encodes into a temporary file and returns its bytes on `finalize`.
pub struct FfmpegMuxer {
    _dir: TempDir,
    path: PathBuf,
    output: Option<AVFormatContextOutput>,
    video: Option<VideoEncoder>,
    audio: Option<AudioEncoder>,
    header_written: bool,
}

impl FfmpegMuxer {
    pub fn new(format: ExportFormat) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(format!("export.{}", format.extension()));
        Ok(Self {
            _dir: dir,
            path,
            output: None,
            video: None,
            audio: None,
            header_written: false,
        })
    }

    fn output(&mut self) -> Result<&mut AVFormatContextOutput> {
        self.output
            .as_mut()
            .ok_or_else(|| MediaError::Encoder("muxer not started".into()))
    }

    fn needs_global_header(&mut self) -> Result<bool> {
        Ok(self.output()?.oformat().flags & ffi::AVFMT_GLOBALHEADER as i32 != 0)
    }

    fn add_stream(&mut self, ctx: &AVCodecContext) -> Result<i32> {
        let output = self.output()?;
        let codecpar = ctx.extract_codecpar();
        let mut stream = output.new_stream();
        stream.set_codecpar(codecpar);
        Ok(stream.index)
    }

    fn ensure_header(&mut self) -> Result<()> {
        if !self.header_written {
            self.output()?
                .write_header(&mut None)
                .map_err(|e| MediaError::Encoder(format!("write_header: {e}")))?;
            self.header_written = true;
        }
        Ok(())
    }

    fn encode_audio_chunk(&mut self, samples: &[f32], nb_samples: usize) -> Result<()> {
        let (Some(audio), Some(output)) = (self.audio.as_mut(), self.output.as_mut()) else {
            return Err(MediaError::Encoder("no audio track".into()));
        };
        let frame = interleaved_f32_to_fltp_frame(
            samples,
            audio.channels as i32,
            nb_samples as i32,
            audio.sample_rate,
            audio.next_pts,
        )?;
        audio.next_pts += nb_samples as i64;
        encode_frame(&mut audio.ctx, output, Some(&frame), audio.stream_index)
    }
}

impl Muxer for FfmpegMuxer {
    fn start(&mut self) -> Result<()> {
        let path_str = self.path.to_string_lossy().to_string();
        let c_path = CString::new(path_str.clone()).map_err(|_| MediaError::Encoder(format!("invalid path: {path_str}")))?;
        let output = AVFormatContextOutput::create(&c_path)
            .map_err(|e| MediaError::Encoder(format!("failed to create output: {e}")))?;
        self.output = Some(output);
        Ok(())
    }

    fn add_video_track(&mut self, config: &VideoTrackConfig) -> Result<()> {
        let codec = AVCodec::find_encoder_by_name(encoder_name(config.codec)?)
            .ok_or_else(|| MediaError::Encoder(format!("{} encoder not found", config.codec)))?;
        let global_header = self.needs_global_header()?;

        // x264 needs even dimensions.
        let width = (config.width & !1).max(2) as i32;
        let height = (config.height & !1).max(2) as i32;
        let fps = config.fps.max(1) as i32;

        let mut ctx = AVCodecContext::new(&codec);
        ctx.set_width(width);
        ctx.set_height(height);
        ctx.set_pix_fmt(ffi::AV_PIX_FMT_YUV420P);
        ctx.set_time_base(ffi::AVRational { num: 1, den: fps });
        ctx.set_framerate(ffi::AVRational { num: fps, den: 1 });
        unsafe {
            use rsmpeg::UnsafeDerefMut;
            ctx.deref_mut().bit_rate = config.bitrate_kbps as i64 * 1000;
            if global_header {
                ctx.deref_mut().flags |= ffi::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }
        ctx.open(None)
            .map_err(|e| MediaError::Encoder(format!("failed to open video encoder: {e}")))?;

        let stream_index = self.add_stream(&ctx)?;
        self.video = Some(VideoEncoder {
            ctx,
            sws_ctx: None,
            stream_index,
            fps: config.fps.max(1),
            width,
            height,
        });
        Ok(())
    }

    fn add_audio_track(&mut self, config: &AudioTrackConfig) -> Result<()> {
        let codec = AVCodec::find_encoder_by_name(encoder_name(config.codec)?)
            .ok_or_else(|| MediaError::Encoder(format!("{} encoder not found", config.codec)))?;
        let global_header = self.needs_global_header()?;
        let sample_rate = config.sample_rate as i32;

        let mut ctx = AVCodecContext::new(&codec);
        ctx.set_sample_rate(sample_rate);
        ctx.set_sample_fmt(ffi::AV_SAMPLE_FMT_FLTP);
        ctx.set_time_base(ffi::AVRational { num: 1, den: sample_rate });
        let layout = AVChannelLayout::from_nb_channels(config.channels as i32);
        unsafe {
            ffi::av_channel_layout_copy(&mut (*ctx.as_mut_ptr()).ch_layout, layout.as_ptr());
            use rsmpeg::UnsafeDerefMut;
            ctx.deref_mut().bit_rate = config.bitrate_kbps as i64 * 1000;
            if global_header {
                ctx.deref_mut().flags |= ffi::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }
        ctx.open(None)
            .map_err(|e| MediaError::Encoder(format!("failed to open audio encoder: {e}")))?;

        let frame_size = unsafe { (*ctx.as_ptr()).frame_size };
        let stream_index = self.add_stream(&ctx)?;
        self.audio = Some(AudioEncoder {
            ctx,
            stream_index,
            frame_size: if frame_size > 0 { frame_size as usize } else { 1024 },
            channels: config.channels.max(1) as usize,
            sample_rate,
            fifo: Vec::new(),
            next_pts: 0,
        });
        Ok(())
    }

    fn append_video(&mut self, frame: &FrameBuffer, timestamp: Duration) -> Result<()> {
        self.ensure_header()?;
        let (Some(video), Some(output)) = (self.video.as_mut(), self.output.as_mut()) else {
            return Err(MediaError::Encoder("no video track".into()));
        };

        let mut src = AVFrame::new();
        src.set_width(frame.width as i32);
        src.set_height(frame.height as i32);
        src.set_format(ffi::AV_PIX_FMT_RGBA);
        src.alloc_buffer()
            .map_err(|e| MediaError::Encoder(format!("alloc rgba frame: {e}")))?;
        let linesize = src.linesize[0] as usize;
        let row = frame.width as usize * 4;
        for (y, bytes) in frame.data.chunks_exact(row).enumerate() {
            unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), src.data[0].add(y * linesize), row);
            }
        }

        if video.sws_ctx.is_none() {
            video.sws_ctx = Some(
                SwsContext::get_context(
                    frame.width as i32,
                    frame.height as i32,
                    ffi::AV_PIX_FMT_RGBA,
                    video.width,
                    video.height,
                    ffi::AV_PIX_FMT_YUV420P,
                    ffi::SWS_BICUBIC,
                    None,
                    None,
                    None,
                )
                .ok_or_else(|| MediaError::Encoder("failed to create sws context".into()))?,
            );
        }
        let mut yuv = AVFrame::new();
        yuv.set_width(video.width);
        yuv.set_height(video.height);
        yuv.set_format(ffi::AV_PIX_FMT_YUV420P);
        yuv.alloc_buffer()
            .map_err(|e| MediaError::Encoder(format!("alloc yuv frame: {e}")))?;
        if let Some(sws) = video.sws_ctx.as_mut() {
            sws.scale_frame(&src, 0, frame.height as i32, &mut yuv)
                .map_err(|e| MediaError::Encoder(format!("scale_frame: {e}")))?;
        }
        yuv.set_pts((timestamp.as_secs_f64() * video.fps as f64).round() as i64);

        encode_frame(&mut video.ctx, output, Some(&yuv), video.stream_index)
    }

    fn append_audio(&mut self, block: &AudioBlock, _timestamp: Duration) -> Result<()> {
        self.ensure_header()?;
        let chunk = {
            let audio = self
                .audio
                .as_mut()
                .ok_or_else(|| MediaError::Encoder("no audio track".into()))?;
            audio.fifo.extend(block.to_f32_interleaved());
            audio.frame_size * audio.channels
        };
        loop {
            let samples: Vec<f32> = match self.audio.as_mut() {
                Some(audio) if audio.fifo.len() >= chunk => audio.fifo.drain(..chunk).collect(),
                _ => break,
            };
            let nb = chunk / self.audio.as_ref().map_or(1, |a| a.channels);
            self.encode_audio_chunk(&samples, nb)?;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<Vec<u8>> {
        self.ensure_header()?;

        // Pad the audio tail to a whole encoder frame.
        let tail = self.audio.as_mut().and_then(|audio| {
            if audio.fifo.is_empty() {
                return None;
            }
            let mut samples: Vec<f32> = audio.fifo.drain(..).collect();
            samples.resize(audio.frame_size * audio.channels, 0.0);
            Some((samples, audio.frame_size))
        });
        if let Some((samples, nb)) = tail {
            self.encode_audio_chunk(&samples, nb)?;
        }

        let output = self
            .output
            .as_mut()
            .ok_or_else(|| MediaError::Encoder("muxer not started".into()))?;
        if let Some(video) = self.video.as_mut() {
            encode_frame(&mut video.ctx, output, None, video.stream_index)?;
        }
        if let Some(audio) = self.audio.as_mut() {
            encode_frame(&mut audio.ctx, output, None, audio.stream_index)?;
        }
        output
            .write_trailer()
            .map_err(|e| MediaError::Encoder(format!("write_trailer: {e}")))?;
        self.output = None;

        let bytes = std::fs::read(&self.path)?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "container finalized");
        Ok(bytes)
    }
}

/// Convert interleaved f32 PCM samples to a planar float (FLTP) AVFrame.
fn interleaved_f32_to_fltp_frame(
    samples: &[f32],
    channels: i32,
    nb_samples: i32,
    sample_rate: i32,
    pts: i64,
) -> Result<AVFrame> {
    let mut frame = AVFrame::new();
    frame.set_format(ffi::AV_SAMPLE_FMT_FLTP);
    frame.set_sample_rate(sample_rate);
    frame.set_nb_samples(nb_samples);
    let ch_layout = AVChannelLayout::from_nb_channels(channels);
    unsafe {
        ffi::av_channel_layout_copy(&mut (*frame.as_mut_ptr()).ch_layout, ch_layout.as_ptr());
    }
    frame
        .alloc_buffer()
        .map_err(|e| MediaError::Encoder(format!("alloc audio frame: {e}")))?;
    frame.set_pts(pts);

    for ch in 0..channels as usize {
        unsafe {
            let plane = frame.data[ch] as *mut f32;
            for s in 0..nb_samples as usize {
                let idx = s * channels as usize + ch;
                *plane.add(s) = samples.get(idx).copied().unwrap_or(0.0);
            }
        }
    }
    Ok(frame)
}

/// Encode a single frame (or flush with `None`) and write resulting packets.
fn encode_frame(
    enc_ctx: &mut AVCodecContext,
    output_ctx: &mut AVFormatContextOutput,
    frame: Option<&AVFrame>,
    stream_index: i32,
) -> Result<()> {
    enc_ctx
        .send_frame(frame)
        .map_err(|e| MediaError::Encoder(format!("send_frame: {e}")))?;
    let stream_tb = output_ctx.streams()[stream_index as usize].time_base;
    // Drain until EAGAIN or EOF.
    while let Ok(mut packet) = enc_ctx.receive_packet() {
        packet.rescale_ts(enc_ctx.time_base, stream_tb);
        packet.set_stream_index(stream_index);
        output_ctx
            .interleaved_write_frame(&mut packet)
            .map_err(|e| MediaError::Encoder(format!("write_frame: {e}")))?;
    }
    Ok(())
}
