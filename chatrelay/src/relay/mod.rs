//! Upstream SSE decoding and the per-turn stream relay.

mod decoder;
mod event;
mod frame;
mod inline;
mod sse;
mod turn;

pub use decoder::UpstreamDecoder;
pub use event::{FragmentKind, StreamEvent, UpstreamEventKind, UpstreamMetadata, UpstreamPayload};
pub use frame::{DownstreamFrame, FrameMetadata};
pub use inline::{parse_tag_body, InlineCitationParser, ParsedFragment};
pub use sse::{parse_line, LineDecoder, SseLine, DEFAULT_MAX_LINE_BYTES};
pub use turn::{fallback_message, Downstream, RelayOutcome, StreamRelay, TurnStatus};
