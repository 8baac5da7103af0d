//! [`Decoder`]/[`Encoder`] glue for framing transfer frames directly off a
//! byte stream. Unlike a variable-length packet codec, no synchronization-
//! marker scanning is needed: every frame emitted by a physical channel is
//! exactly [`PcConfig::frame_length`](crate::physical_channel::PcConfig)
//! bytes, so the codec only needs to wait for that many bytes to arrive.

use bytes::{Buf, BytesMut};

use crate::error::TmtpError;
use crate::physical_channel::PhysicalChannel;
use crate::timestamp::{FrameBitrate, FrameTimestamp};
use crate::warning::ChannelWarning;

#[cfg_attr(
    docsrs,
    doc(cfg(any(feature = "async-codec", feature = "tokio-codec")))
)]
/// A Codec used to Encode/Decode transfer frames from Streams and Sinks.
/// Owns the [`PhysicalChannel`] it frames against; every decoded frame is
/// dispatched through it immediately, so `Decoder::Item` is the
/// [`ChannelWarning`] the dispatch produced rather than the frame itself.
/// Reassembled packets and OCF values are retrieved from the underlying
/// channel's virtual channels afterwards.
pub struct TmFrameCodec {
    physical_channel: PhysicalChannel,
}

impl TmFrameCodec {
    pub fn new(physical_channel: PhysicalChannel) -> Self {
        Self { physical_channel }
    }

    pub fn physical_channel(&self) -> &PhysicalChannel {
        &self.physical_channel
    }

    pub fn physical_channel_mut(&mut self) -> &mut PhysicalChannel {
        &mut self.physical_channel
    }

    pub fn into_physical_channel(self) -> PhysicalChannel {
        self.physical_channel
    }

    fn frame_length(&self) -> usize {
        self.physical_channel.config().frame_length as usize
    }

    fn decode_helper(&mut self, buffer: &mut BytesMut) -> Result<Option<ChannelWarning>, TmtpError> {
        let frame_length = self.frame_length();

        if buffer.remaining() < frame_length {
            buffer.reserve(frame_length - buffer.remaining());
            return Ok(None);
        }

        let data = buffer.as_ref()[..frame_length].to_vec();
        buffer.advance(frame_length);

        let warning = self
            .physical_channel
            .receive_frame(&data, FrameTimestamp::new(), FrameBitrate::new());
        Ok(Some(warning))
    }

    fn encode_helper(&mut self, timestamp: FrameTimestamp, dst: &mut BytesMut) -> Result<(), TmtpError> {
        let bytes = self.physical_channel.send_frame(timestamp)?;
        dst.reserve(bytes.len());
        dst.extend(bytes);
        Ok(())
    }
}

#[cfg(feature = "async-codec")]
mod non_tokio {
    use super::*;

    use asynchronous_codec::{Decoder, Encoder};

    impl Decoder for TmFrameCodec {
        type Item = ChannelWarning;

        type Error = TmtpError;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
            self.decode_helper(src)
        }
    }

    impl Encoder for TmFrameCodec {
        type Item = FrameTimestamp;

        type Error = TmtpError;

        fn encode(&mut self, item: Self::Item, dst: &mut asynchronous_codec::BytesMut) -> Result<(), Self::Error> {
            self.encode_helper(item, dst)
        }
    }
}

#[cfg(feature = "tokio-codec")]
mod tokio_codec {
    use tokio_util::codec::{Decoder, Encoder};

    use super::*;

    impl Decoder for TmFrameCodec {
        type Item = ChannelWarning;

        type Error = TmtpError;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
            self.decode_helper(src)
        }
    }

    impl Encoder<FrameTimestamp> for TmFrameCodec {
        type Error = TmtpError;

        fn encode(&mut self, item: FrameTimestamp, dst: &mut BytesMut) -> Result<(), Self::Error> {
            self.encode_helper(item, dst)
        }
    }
}
