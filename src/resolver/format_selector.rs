// FormatSelector - picks the rendition to stream
//
// Audio-only formats win, highest bitrate first. When a provider offers no
// audio-only rendition the first format of the original list is used so
// muxed-only content still plays.

use super::errors::ResolveError;
use super::models::MediaFormat;

pub struct FormatSelector;

impl FormatSelector {
    /// Best audio-only format; ties keep list order, first wins.
    pub fn best_audio(formats: &[MediaFormat]) -> Result<&MediaFormat, ResolveError> {
        let first = formats.first().ok_or(ResolveError::NoFormatAvailable)?;

        let mut best: Option<&MediaFormat> = None;
        for format in formats.iter().filter(|f| f.is_audio_only()) {
            match best {
                Some(current) if format.effective_bitrate() <= current.effective_bitrate() => {}
                _ => best = Some(format),
            }
        }

        Ok(best.unwrap_or(first))
    }

    /// Same as [`best_audio`](Self::best_audio) but ignores formats without a
    /// resolvable URL (signature-ciphered or metadata-only entries).
    pub fn best_playable_audio(formats: &[MediaFormat]) -> Result<MediaFormat, ResolveError> {
        let playable: Vec<MediaFormat> = formats
            .iter()
            .filter(|f| !f.url.is_empty())
            .cloned()
            .collect();
        Self::best_audio(&playable).cloned()
    }
}
