//! Request encoding: selected image + parameters → JSON request body.
//!
//! The conversion API takes the original file inline as standard base64
//! (with padding), the same payload a browser `FileReader.readAsDataURL`
//! produces once the `data:<mime>;base64,` prefix is stripped.

use crate::config::ConversionParameters;
use crate::pipeline::intake::SelectedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Body of one conversion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    /// Base64-encoded original image bytes.
    pub original: String,
    /// Original file name, forwarded for the service's logs and naming.
    pub filename: String,
    /// Quality dial, already clamped.
    pub quality: u8,
    /// Ask the service to drop the background fill.
    pub transparent_background: bool,
}

/// Build the request for `image` with the current `params`.
pub fn build_request(image: &SelectedImage, params: &ConversionParameters) -> ConvertRequest {
    let original = STANDARD.encode(image.bytes());
    debug!(
        "Encoded {} → {} bytes base64",
        image.file_name(),
        original.len()
    );

    ConvertRequest {
        original,
        filename: image.file_name().to_string(),
        quality: params.quality(),
        transparent_background: params.transparent_background(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::intake::{accept, CandidateFile};

    #[test]
    fn request_carries_base64_and_parameters() {
        let image = accept(CandidateFile::new(
            vec![0x89, b'P', b'N', b'G', 0, 1, 2],
            "logo.png",
            "image/png",
        ))
        .unwrap();
        let params = ConversionParameters::new(9, true);

        let req = build_request(&image, &params);
        assert_eq!(req.filename, "logo.png");
        assert_eq!(req.quality, 9);
        assert!(req.transparent_background);
        assert_eq!(STANDARD.decode(&req.original).unwrap(), image.bytes());
    }

    #[test]
    fn wire_format_is_camel_case() {
        let req = ConvertRequest {
            original: "AAAA".into(),
            filename: "a.png".into(),
            quality: 5,
            transparent_background: false,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["original"], "AAAA");
        assert_eq!(json["filename"], "a.png");
        assert_eq!(json["quality"], 5);
        assert_eq!(json["transparentBackground"], false);
    }
}
