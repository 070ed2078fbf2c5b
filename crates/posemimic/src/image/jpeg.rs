use std::{
    env::{self, VarError},
    panic::catch_unwind,
    sync::OnceLock,
};

use image::ImageBuffer;
use jpeg_decoder::PixelFormat;

use super::Image;

/// Software JPEG decoders the webcam stream can be decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JpegBackend {
    /// Uses the `jpeg-decoder` crate, a robust but slow pure-Rust JPEG decoder.
    JpegDecoder,
    /// Uses the `mozjpeg` crate, a wrapper around Mozilla's libjpeg fork. Robust and fast, but C.
    MozJpeg,
}

const DEFAULT_BACKEND: JpegBackend = JpegBackend::MozJpeg;

const BACKEND_VAR: &str = "POSEMIMIC_JPEG_BACKEND";

fn parse_backend(value: Result<String, VarError>) -> Result<JpegBackend, String> {
    match value {
        Ok(v) if v == "mozjpeg" => Ok(JpegBackend::MozJpeg),
        Ok(v) if v == "jpeg-decoder" => Ok(JpegBackend::JpegDecoder),
        Ok(v) => Err(v),
        Err(VarError::NotPresent) => Ok(DEFAULT_BACKEND),
        Err(VarError::NotUnicode(s)) => Err(s.to_string_lossy().into_owned()),
    }
}

fn backend() -> JpegBackend {
    static BACKEND: OnceLock<JpegBackend> = OnceLock::new();
    *BACKEND.get_or_init(|| {
        let backend = parse_backend(env::var(BACKEND_VAR)).unwrap_or_else(|v| {
            log::error!(
                "invalid value set for `{BACKEND_VAR}` variable: '{v}'; using {:?}",
                DEFAULT_BACKEND
            );
            DEFAULT_BACKEND
        });
        log::debug!("using JPEG decode backend: {:?}", backend);
        backend
    })
}

pub(super) fn decode_jpeg(data: &[u8]) -> anyhow::Result<Image> {
    let buf = match backend() {
        JpegBackend::JpegDecoder => {
            let mut decoder = jpeg_decoder::Decoder::new(data);
            let pixels = decoder.decode()?;
            let info = decoder
                .info()
                .ok_or_else(|| anyhow::anyhow!("JPEG decoder produced no image metadata"))?;
            let rgba = match info.pixel_format {
                PixelFormat::RGB24 => pixels
                    .chunks_exact(3)
                    .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 255])
                    .collect::<Vec<_>>(),
                PixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l, 255]).collect(),
                other => anyhow::bail!("unsupported JPEG pixel format {other:?}"),
            };
            ImageBuffer::from_raw(info.width.into(), info.height.into(), rgba)
                .ok_or_else(|| anyhow::anyhow!("decoded JPEG has unexpected buffer size"))?
        }
        JpegBackend::MozJpeg => {
            // mozjpeg reports errors only via unwinding
            let (buf, width, height) = catch_unwind(|| -> anyhow::Result<_> {
                let mut decompress = mozjpeg::Decompress::new_mem(data)?;

                // Tune settings for decode performance.
                decompress.do_fancy_upsampling(false);
                decompress.dct_method(mozjpeg::DctMethod::IntegerFast);

                let mut decompress = decompress.rgba()?;
                let buf = decompress
                    .read_scanlines_flat()
                    .ok_or_else(|| anyhow::anyhow!("failed to decode image"))?;
                Ok((buf, decompress.width(), decompress.height()))
            })
            .map_err(|payload| match payload.downcast::<String>() {
                Ok(string) => anyhow::Error::msg(string),
                Err(_) => anyhow::anyhow!("<unknown panic message>"),
            })??;

            ImageBuffer::from_raw(u32::try_from(width)?, u32::try_from(height)?, buf)
                .ok_or_else(|| anyhow::anyhow!("decoded JPEG has unexpected buffer size"))?
        }
    };

    Ok(Image { buf })
}
