//! Audio decode through symphonia's codec registry.

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet as SymphoniaPacket;

use crate::container::Packet;
use crate::decoder::{AudioCodec, RawAudio};
use crate::error::{MediaError, MediaResult};

pub struct SymphoniaAudioCodec {
    decoder: Box<dyn Decoder>,
    track_id: u32,
    name: String,
    ready: Option<RawAudio>,
}

impl SymphoniaAudioCodec {
    pub fn new(params: &CodecParameters, track_id: u32) -> MediaResult<Self> {
        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| MediaError::OpenFailed(format!("Failed to create audio decoder: {}", e)))?;

        let name = symphonia::default::get_codecs()
            .get_codec(params.codec)
            .map(|c| c.short_name.to_string())
            .unwrap_or_else(|| format!("{:?}", params.codec));

        Ok(Self {
            decoder,
            track_id,
            name,
            ready: None,
        })
    }
}

impl AudioCodec for SymphoniaAudioCodec {
    fn name(&self) -> &str {
        &self.name
    }

    fn send_packet(&mut self, packet: &Packet) -> MediaResult<()> {
        let ts = packet.pts.unwrap_or(0).max(0) as u64;
        let dur = packet.duration.unwrap_or(0).max(0) as u64;
        let sym_packet = SymphoniaPacket::new_from_boxed_slice(
            self.track_id,
            ts,
            dur,
            packet.data.to_vec().into_boxed_slice(),
        );

        let decoded = match self.decoder.decode(&sym_packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::ResetRequired) => {
                self.decoder.reset();
                return Err(MediaError::DecodeFailed("decoder reset required".into()));
            }
            Err(e) => return Err(MediaError::DecodeFailed(e.to_string())),
        };

        let spec = *decoded.spec();
        let frames = decoded.frames();
        if frames == 0 {
            return Ok(());
        }

        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_planar_ref(decoded);
        let planes = buf.samples().chunks(frames).map(<[f32]>::to_vec).collect();

        self.ready = Some(RawAudio {
            pts: packet.pts,
            sample_rate: spec.rate,
            planes,
        });
        Ok(())
    }

    fn send_eof(&mut self) -> MediaResult<()> {
        // symphonia decoders emit everything per packet.
        Ok(())
    }

    fn receive_audio(&mut self) -> MediaResult<Option<RawAudio>> {
        Ok(self.ready.take())
    }

    fn reset(&mut self) {
        self.decoder.reset();
        self.ready = None;
    }
}
