// Copyright (C) 2024 Huawei Device Co., Ltd.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Image and audio decoding boundary.

use std::io::Cursor;

use asset_core::{AssetError, AudioData, TextureData};
use hound::{SampleFormat, WavReader};
use image::ImageFormat;

/// Decodes fetched bytes into host-renderable media.
///
/// Hosts that upload to a GPU or an audio device implement this and attach
/// a [`HostHandle`](asset_core::HostHandle) to the decoded data.
pub trait MediaDecoder: Send + Sync {
    /// Decodes an image. `hint` is a format extension such as `"png"`.
    fn decode_image(&self, bytes: &[u8], hint: Option<&str>) -> Result<TextureData, AssetError>;

    fn decode_audio(&self, bytes: &[u8]) -> Result<AudioData, AssetError>;
}

/// Decodes images with the `image` crate and WAV audio with `hound`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultMediaDecoder;

impl MediaDecoder for DefaultMediaDecoder {
    fn decode_image(&self, bytes: &[u8], hint: Option<&str>) -> Result<TextureData, AssetError> {
        let decoded = match hint.and_then(ImageFormat::from_extension) {
            Some(format) => image::load_from_memory_with_format(bytes, format),
            None => image::load_from_memory(bytes),
        }
        .map_err(|e| AssetError::validation(format!("image decode failed: {}", e)))?;
        let rgba = decoded.to_rgba8();
        Ok(TextureData {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
            handle: None,
        })
    }

    /// Integer samples are scaled into `[-1, 1]`.
    fn decode_audio(&self, bytes: &[u8]) -> Result<AudioData, AssetError> {
        let reader = WavReader::new(Cursor::new(bytes))
            .map_err(|e| AssetError::validation(format!("wav decode failed: {}", e)))?;
        let spec = reader.spec();
        let samples: Result<Vec<f32>, hound::Error> = match spec.sample_format {
            SampleFormat::Float => reader.into_samples::<f32>().collect(),
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|s| s as f32 / scale))
                    .collect()
            }
        };
        let samples =
            samples.map_err(|e| AssetError::validation(format!("wav samples corrupt: {}", e)))?;
        Ok(AudioData {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
            handle: None,
        })
    }
}
