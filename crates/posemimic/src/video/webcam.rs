//! V4L2 webcam access.
//!
//! Only `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported.

use std::{env, path::PathBuf};

use anyhow::{bail, Context};
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, Pixelformat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::config::CameraConfig;
use crate::image::{Image, Resolution};
use crate::timer::Timer;

/// Environment variable selecting the webcam by its card name instead of its device number.
pub const ENV_VAR_WEBCAM_NAME: &str = "POSEMIMIC_WEBCAM_NAME";

/// A resolution and frame interval a webcam supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub resolution: Resolution,
    pub frame_interval: Fract,
}

impl FrameFormat {
    pub fn fps(&self) -> f32 {
        1.0 / self.frame_interval.as_f32()
    }
}

/// Picks the format closest to the desired resolution, then to the desired frame rate.
pub fn closest_format(formats: &[FrameFormat], resolution: Resolution, fps: u32) -> Option<FrameFormat> {
    formats.iter().copied().min_by_key(|fmt| {
        let dw = fmt.resolution.width().abs_diff(resolution.width());
        let dh = fmt.resolution.height().abs_diff(resolution.height());
        let dfps = (fmt.fps().round() - fps as f32).abs() as u32;
        (dw + dh, dfps)
    })
}

fn supported_formats(device: &Device, pixel_format: Pixelformat) -> anyhow::Result<Vec<FrameFormat>> {
    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        frame_interval: *rate.fract(),
                    });
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }
    Ok(formats)
}

fn negotiate_format(device: &Device, config: &CameraConfig) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixelformat() == Pixelformat::JPEG || format.pixelformat() == Pixelformat::MJPG {
            pixel_format = Some(format.pixelformat());
            break;
        }
    }
    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found (device must support JPEG or MJPG)");
    };

    let wanted = Resolution::new(config.width, config.height);
    let formats = supported_formats(device, pixel_format)?;
    let Some(fmt) = closest_format(&formats, wanted, config.fps) else {
        bail!("device does not report any frame sizes");
    };
    if fmt.resolution != wanted || fmt.fps().round() as u32 != config.fps {
        log::warn!(
            "camera does not support {wanted} @ {}Hz, using {} @ {:.1}Hz",
            config.fps,
            fmt.resolution,
            fmt.fps(),
        );
    }

    Ok((
        PixFormat::new(fmt.resolution.width(), fmt.resolution.height(), pixel_format),
        fmt.frame_interval,
    ))
}

/// A webcam yielding a stream of [`Image`]s.
pub struct Webcam {
    stream: ReadStream,
    name: String,
    resolution: Resolution,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the webcam selected by `config`.
    ///
    /// If `POSEMIMIC_WEBCAM_NAME` is set, the device with that card name is opened. Otherwise
    /// `/dev/video{device_id}` is used.
    ///
    /// This can block for a significant amount of time while the webcam initializes (on the order
    /// of hundreds of milliseconds).
    pub fn open(config: &CameraConfig) -> anyhow::Result<Self> {
        let result = match env::var(ENV_VAR_WEBCAM_NAME) {
            Ok(name) => {
                log::debug!("webcam override: `{ENV_VAR_WEBCAM_NAME}` is set to '{name}'");
                Self::open_by_name(&name, config)
            }
            Err(_) => Self::open_by_id(config),
        };
        result.context("Failed to open camera")
    }

    fn open_by_id(config: &CameraConfig) -> anyhow::Result<Self> {
        let path = PathBuf::from(format!("/dev/video{}", config.device_id));
        let device =
            Device::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
        Self::open_device(device, config)
    }

    fn open_by_name(name: &str, config: &CameraConfig) -> anyhow::Result<Self> {
        for res in linuxvideo::list()? {
            let device = match res {
                Ok(device) => device,
                Err(e) => {
                    log::warn!("{e}");
                    continue;
                }
            };
            if device.capabilities()?.card() != name {
                continue;
            }
            match Self::open_device(device, config) {
                Ok(webcam) => return Ok(webcam),
                Err(e) => log::debug!("{e:#}"),
            }
        }

        bail!("no supported webcam named '{name}' found")
    }

    fn open_device(device: Device, config: &CameraConfig) -> anyhow::Result<Self> {
        let caps = device.capabilities()?;
        let cap_flags = caps.device_capabilities();
        let path = device.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );
        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            bail!("{} is not a video capture device", path.display());
        }

        let (pixfmt, fract) = negotiate_format(&device, config)?;
        let capture = device.video_capture(pixfmt)?;
        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());
        let actual = capture.set_frame_interval(fract)?;

        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            caps.card(),
            path.display(),
            resolution,
            1.0 / actual.as_f32(),
        );

        let stream = capture.into_stream(2)?;

        Ok(Self {
            stream,
            name: caps.card().to_string(),
            resolution,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Reads the next frame from the camera, blocking until one is available.
    ///
    /// Webcams occasionally deliver corrupted MJPEG frames. Those are logged and replaced by a
    /// blank frame, so only device errors are returned.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let dequeue_guard = self.t_dequeue.start();
        let (width, height) = (self.resolution.width(), self.resolution.height());
        let t_decode = &self.t_decode;
        self.stream
            .dequeue(|buf| {
                drop(dequeue_guard);
                let image = match t_decode.time(|| Image::decode_jpeg(&buf)) {
                    Ok(image) => image,
                    Err(e) => {
                        log::error!("webcam decode error: {e:#}");
                        Image::new(width, height)
                    }
                };
                Ok(image)
            })
            .context("failed to read camera frame")
    }

    /// Returns profiling timers for webcam access and decoding.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_dequeue, &self.t_decode].into_iter()
    }
}

impl Drop for Webcam {
    fn drop(&mut self) {
        log::info!("Camera released ({})", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(width: u32, height: u32, fps: u32) -> FrameFormat {
        FrameFormat {
            resolution: Resolution::new(width, height),
            frame_interval: Fract::new(1, fps),
        }
    }

    #[test]
    fn exact_match() {
        let formats = [
            format(1280, 720, 30),
            format(640, 480, 30),
            format(640, 480, 15),
        ];
        assert_eq!(
            closest_format(&formats, Resolution::new(640, 480), 30),
            Some(format(640, 480, 30))
        );
    }

    #[test]
    fn resolution_takes_precedence_over_fps() {
        let formats = [format(1920, 1080, 60), format(640, 480, 15)];
        assert_eq!(
            closest_format(&formats, Resolution::new(640, 480), 40),
            Some(format(640, 480, 15))
        );
    }

    #[test]
    fn closest_fps_at_resolution() {
        let formats = [
            format(640, 480, 5),
            format(640, 480, 30),
            format(640, 480, 60),
        ];
        assert_eq!(
            closest_format(&formats, Resolution::new(640, 480), 40),
            Some(format(640, 480, 30))
        );
        assert_eq!(closest_format(&[], Resolution::new(640, 480), 30), None);
    }
}
