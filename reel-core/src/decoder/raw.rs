//! Uncompressed video: each packet already holds one picture.

use std::collections::VecDeque;

use crate::container::Packet;
use crate::decoder::{RawPicture, VideoCodec};
use crate::error::{MediaError, MediaResult};
use crate::stream::PixelFormat;

pub struct RawVideoCodec {
    width: u32,
    height: u32,
    format: PixelFormat,
    ready: VecDeque<RawPicture>,
}

impl RawVideoCodec {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            ready: VecDeque::with_capacity(1),
        }
    }
}

impl VideoCodec for RawVideoCodec {
    fn name(&self) -> &str {
        "rawvideo"
    }

    fn send_packet(&mut self, packet: &Packet) -> MediaResult<()> {
        let expected = self.format.buffer_size(self.width, self.height);
        if packet.data.len() != expected {
            return Err(MediaError::DecodeFailed(format!(
                "raw picture is {} bytes, expected {}",
                packet.data.len(),
                expected
            )));
        }

        self.ready.push_back(RawPicture {
            pts: packet.pts,
            width: self.width,
            height: self.height,
            format: self.format,
            data: packet.data.clone(),
        });
        Ok(())
    }

    fn send_eof(&mut self) -> MediaResult<()> {
        Ok(())
    }

    fn receive_picture(&mut self) -> MediaResult<Option<RawPicture>> {
        Ok(self.ready.pop_front())
    }

    fn reset(&mut self) {
        self.ready.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::StreamKind;
    use bytes::Bytes;

    fn packet(data: Vec<u8>) -> Packet {
        Packet {
            stream: StreamKind::Video,
            pts: Some(3),
            duration: Some(1),
            keyframe: true,
            data: Bytes::from(data),
        }
    }

    #[test]
    fn test_passes_picture_through() {
        let mut codec = RawVideoCodec::new(2, 2, PixelFormat::Gray8);
        codec.send_packet(&packet(vec![16; 4])).unwrap();
        let picture = codec.receive_picture().unwrap().unwrap();
        assert_eq!(picture.pts, Some(3));
        assert_eq!(picture.format, PixelFormat::Gray8);
        assert!(codec.receive_picture().unwrap().is_none());
    }

    #[test]
    fn test_rejects_wrong_size() {
        let mut codec = RawVideoCodec::new(2, 2, PixelFormat::Yuv420p);
        assert!(codec.send_packet(&packet(vec![0; 5])).is_err());
        assert!(codec.receive_picture().unwrap().is_none());
    }
}
