use anyhow::Result;
use log::info;

use super::server::{ProtocolServer, RequestHandler};
use super::{check_version, RequestKind, ServerIdent, PROTOCOL_VERSION};
use crate::estimate::Estimator;
use crate::formats::frame::Frame;
use crate::playback::{PlaybackEngine, PlaybackError, PlaybackState, StreamOpener};
use crate::raster::write_pfm;
use crate::source::{decode_image_bytes, encode_jpeg};
use crate::wire::WireMessage;

/// Image encodings [`decode_image_bytes`] accepts in `DEPTH` payloads.
const ACCEPTED_INPUT_FORMATS: &str = "jpg,png";

/// Encoding of every depth map leaving a server.
const OUTPUT_FORMAT: &str = "pfm";

/// Encoding of the image half of an `IMAGE_AND_DEPTH` payload.
const IMAGE_FORMAT: &str = "jpg";

const JPEG_QUALITY: u8 = 90;

/// State behind the compute endpoint: a single estimator answering
/// `HANDSHAKE_DEPTH` and `DEPTH` requests.
pub struct EstimatorService {
    estimator: Box<dyn Estimator>,
    ident: ServerIdent,
}

impl EstimatorService {
    pub fn new(estimator: Box<dyn Estimator>, ident: ServerIdent) -> Self {
        Self { estimator, ident }
    }

    /// Wraps the service in a server with the compute handlers registered.
    pub fn into_server(self) -> ProtocolServer<EstimatorService> {
        let mut server = ProtocolServer::new(self);
        server.register(RequestKind::HandshakeDepth, Box::new(HandshakeDepthHandler));
        server.register(RequestKind::Depth, Box::new(DepthHandler));
        server
    }
}

/// State behind the playback endpoint: a decoded stream plus an estimator
/// that turns each served frame into a depth map on demand.
pub struct PlaybackService {
    estimator: Box<dyn Estimator>,
    engine: PlaybackEngine,
    opener: Box<dyn StreamOpener>,
    ident: ServerIdent,
}

impl PlaybackService {
    pub fn new(
        estimator: Box<dyn Estimator>,
        opener: Box<dyn StreamOpener>,
        max_pixels: i64,
        ident: ServerIdent,
    ) -> Self {
        Self {
            estimator,
            engine: PlaybackEngine::new(max_pixels),
            opener,
            ident,
        }
    }

    /// Opens `media` and starts playing it, exactly as a `REQUEST_PLAY`
    /// for that path would.
    pub fn play_media(&mut self, media: &str) -> Result<(), PlaybackError> {
        let decoder = self.opener.open(media)?;
        info!("Playing {media:?}");
        self.engine.play(decoder);
        Ok(())
    }

    /// Wraps the service in a server with the playback handlers registered.
    pub fn into_server(self) -> ProtocolServer<PlaybackService> {
        let mut server = ProtocolServer::new(self);
        server.register(
            RequestKind::HandshakeImageAndDepth,
            Box::new(HandshakeImageAndDepthHandler),
        );
        server.register(RequestKind::ImageAndDepth, Box::new(ImageAndDepthHandler));
        server.register(RequestKind::RequestPlay, Box::new(RequestPlayHandler));
        server.register(RequestKind::RequestPause, Box::new(RequestPauseHandler));
        server.register(RequestKind::RequestStop, Box::new(RequestStopHandler));
        server
    }
}

struct HandshakeDepthHandler;

impl RequestHandler<EstimatorService> for HandshakeDepthHandler {
    fn handle(&mut self, service: &mut EstimatorService, request: &WireMessage) -> WireMessage {
        if let Some(reject) = check_version(request) {
            return reject;
        }
        reply_or_error(handshake_depth_reply(service))
    }
}

struct DepthHandler;

impl RequestHandler<EstimatorService> for DepthHandler {
    fn handle(&mut self, service: &mut EstimatorService, request: &WireMessage) -> WireMessage {
        reply_or_error(depth_reply(service, request))
    }
}

struct HandshakeImageAndDepthHandler;

impl RequestHandler<PlaybackService> for HandshakeImageAndDepthHandler {
    fn handle(&mut self, service: &mut PlaybackService, request: &WireMessage) -> WireMessage {
        if let Some(reject) = check_version(request) {
            return reject;
        }
        reply_or_error(handshake_image_and_depth_reply(service))
    }
}

struct ImageAndDepthHandler;

impl RequestHandler<PlaybackService> for ImageAndDepthHandler {
    fn handle(&mut self, service: &mut PlaybackService, _request: &WireMessage) -> WireMessage {
        match service.engine.get_frame() {
            Some(frame) => reply_or_error(frame_reply(service, &frame)),
            None => {
                let status = if service.engine.state() == PlaybackState::Stopped {
                    "not_available"
                } else {
                    "not_modified"
                };
                reply_or_error(status_reply(RequestKind::ImageAndDepth, status))
            }
        }
    }
}

struct RequestPlayHandler;

impl RequestHandler<PlaybackService> for RequestPlayHandler {
    fn handle(&mut self, service: &mut PlaybackService, request: &WireMessage) -> WireMessage {
        let failure = match std::str::from_utf8(request.payload()) {
            Ok(media) if !media.trim().is_empty() => {
                service.play_media(media.trim()).err().map(|e| e.to_string())
            }
            _ => Some("Request payload is not a media path".to_string()),
        };
        reply_or_error(control_reply(RequestKind::RequestPlay, failure))
    }
}

struct RequestPauseHandler;

impl RequestHandler<PlaybackService> for RequestPauseHandler {
    fn handle(&mut self, service: &mut PlaybackService, _request: &WireMessage) -> WireMessage {
        service.engine.pause();
        reply_or_error(control_reply(RequestKind::RequestPause, None))
    }
}

struct RequestStopHandler;

impl RequestHandler<PlaybackService> for RequestStopHandler {
    fn handle(&mut self, service: &mut PlaybackService, _request: &WireMessage) -> WireMessage {
        service.engine.stop();
        reply_or_error(control_reply(RequestKind::RequestStop, None))
    }
}

fn handshake_depth_reply(service: &EstimatorService) -> Result<WireMessage> {
    let mut reply = WireMessage::response(RequestKind::HandshakeDepth.pname());
    reply.set("pversion", PROTOCOL_VERSION)?;
    reply.set("model_type", service.estimator.model_type())?;
    reply.set("depth_map_type", service.estimator.output_kind())?;
    reply.set("accepted_input_formats", ACCEPTED_INPUT_FORMATS)?;
    reply.set("output_format", OUTPUT_FORMAT)?;
    reply.set("server_program", &service.ident.program)?;
    reply.set("server_program_version", &service.ident.version)?;
    Ok(reply)
}

/// The whole reply payload is the PFM; single-payload replies carry no
/// length header.
fn depth_reply(service: &mut EstimatorService, request: &WireMessage) -> Result<WireMessage> {
    let frame = decode_image_bytes(request.payload())?;
    let mut map = service.estimator.estimate(&frame)?;
    map.normalize();

    let mut depth = Vec::new();
    write_pfm(&map, &mut depth)?;

    let mut reply = WireMessage::response(RequestKind::Depth.pname());
    reply.set_payload(depth);
    Ok(reply)
}

fn handshake_image_and_depth_reply(service: &PlaybackService) -> Result<WireMessage> {
    let mut reply = WireMessage::response(RequestKind::HandshakeImageAndDepth.pname());
    reply.set("pversion", PROTOCOL_VERSION)?;
    reply.set("image_format", IMAGE_FORMAT)?;
    reply.set("output_format", OUTPUT_FORMAT)?;
    reply.set("depth_map_type", service.estimator.output_kind())?;
    reply.set("server_program", &service.ident.program)?;
    reply.set("server_program_version", &service.ident.version)?;
    Ok(reply)
}

/// Builds the `status=new` reply, `JPEG || PFM` concatenated in the payload
/// with one length header per half.
fn frame_reply(service: &mut PlaybackService, frame: &Frame) -> Result<WireMessage> {
    let image = encode_jpeg(frame, JPEG_QUALITY)?;
    let mut map = service.estimator.estimate(frame)?;
    map.normalize();

    let mut depth = Vec::new();
    write_pfm(&map, &mut depth)?;

    let mut reply = WireMessage::response(RequestKind::ImageAndDepth.pname());
    reply.set("status", "new")?;
    reply.set("len_image", image.len())?;
    reply.set("len_depth", depth.len())?;

    let mut payload = image;
    payload.extend_from_slice(&depth);
    reply.set_payload(payload);
    Ok(reply)
}

fn status_reply(kind: RequestKind, status: &str) -> Result<WireMessage> {
    let mut reply = WireMessage::response(kind.pname());
    reply.set("status", status)?;
    Ok(reply)
}

/// `success=true`, or `success=false` with the cause as payload.
fn control_reply(kind: RequestKind, failure: Option<String>) -> Result<WireMessage> {
    let mut reply = WireMessage::response(kind.pname());
    match failure {
        None => reply.set("success", "true")?,
        Some(cause) => {
            reply.set("success", "false")?;
            reply.set_payload(cause.into_bytes());
        }
    }
    Ok(reply)
}

fn reply_or_error(result: Result<WireMessage>) -> WireMessage {
    match result {
        Ok(reply) => reply,
        Err(e) => WireMessage::error(&format!("{e:#}")),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use image::{ImageOutputFormat, RgbImage};

    use super::*;
    use crate::estimate::luma::LumaEstimator;
    use crate::playback::{DecodeEvent, PlaybackError, StreamDecoder};
    use crate::protocol::WireClient;

    fn compute_server() -> ProtocolServer<EstimatorService> {
        EstimatorService::new(Box::new(LumaEstimator::new()), ServerIdent::new()).into_server()
    }

    fn handshake(pname: &str, pversion: &str) -> WireMessage {
        let mut request = WireMessage::request(pname);
        request.set("pversion", pversion).unwrap();
        request
    }

    fn gradient_png() -> Vec<u8> {
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(0, 0, image::Rgb([0, 0, 0]));
        img.put_pixel(1, 0, image::Rgb([80, 80, 80]));
        img.put_pixel(0, 1, image::Rgb([160, 160, 160]));
        img.put_pixel(1, 1, image::Rgb([255, 255, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    struct ScriptedOpener;

    impl StreamOpener for ScriptedOpener {
        fn open(&self, media: &str) -> Result<Box<dyn StreamDecoder>, PlaybackError> {
            if media.ends_with(".bad") {
                return Err(PlaybackError::Open(format!("cannot open {media:?}")));
            }
            Ok(Box::new(ScriptedDecoder { left: 2 }))
        }
    }

    struct ScriptedDecoder {
        left: usize,
    }

    impl StreamDecoder for ScriptedDecoder {
        fn poll(&mut self) -> DecodeEvent {
            if self.left == 0 {
                return DecodeEvent::Eof;
            }
            self.left -= 1;
            let data = (0..12).map(|i| i as f32 / 11.0).collect();
            DecodeEvent::Frame(Frame::new(2, 2, data), Duration::from_millis(80))
        }
    }

    fn playback_server() -> ProtocolServer<PlaybackService> {
        PlaybackService::new(
            Box::new(LumaEstimator::new()),
            Box::new(ScriptedOpener),
            0,
            ServerIdent::new(),
        )
        .into_server()
    }

    #[test]
    fn depth_handshake_advertises_capabilities() {
        let mut server = compute_server();
        let reply = server.process(&handshake("HANDSHAKE_DEPTH", "2"));
        assert_eq!(reply.pname(), Some("HANDSHAKE_DEPTH"));
        assert_eq!(reply.get("model_type"), Some("luma"));
        assert_eq!(reply.get("depth_map_type"), Some("inverse"));
        assert_eq!(reply.get("accepted_input_formats"), Some("jpg,png"));
        assert_eq!(reply.get("output_format"), Some("pfm"));
        assert_eq!(reply.get("server_program"), Some("depthtk"));
    }

    #[test]
    fn newer_client_is_turned_away_at_handshake() {
        let mut server = compute_server();
        let reply = server.process(&handshake("HANDSHAKE_DEPTH", "3"));
        assert_eq!(reply.pname(), Some("ERROR"));
        assert!(!reply.payload().is_empty());

        let reply = server.process(&handshake("HANDSHAKE_DEPTH", "1"));
        assert_eq!(reply.pname(), Some("HANDSHAKE_DEPTH"));
    }

    #[test]
    fn depth_requests_are_not_version_gated() {
        let mut server = compute_server();
        let mut request = WireMessage::request("DEPTH");
        request.set("pversion", "99").unwrap();
        request.set_payload(gradient_png());
        assert_eq!(server.process(&request).pname(), Some("DEPTH"));
    }

    #[test]
    fn depth_request_computes_pfm() {
        let mut server = compute_server();
        let mut request = WireMessage::request("DEPTH");
        request.set_payload(gradient_png());

        let reply = server.process(&request);
        assert_eq!(reply.pname(), Some("DEPTH"));
        assert_eq!(reply.get("len_depth"), None);
        assert!(reply.payload().starts_with(b"Pf\n2 2\n-1.000000\n"));
        // header plus four little-endian f32 samples
        assert_eq!(reply.payload().len(), 17 + 16);
    }

    #[test]
    fn undecodable_depth_payload_yields_error() {
        let mut server = compute_server();
        let mut request = WireMessage::request("DEPTH");
        request.set_payload(b"not an image".to_vec());

        let reply = server.process(&request);
        assert_eq!(reply.pname(), Some("ERROR"));
        assert!(!reply.payload().is_empty());
    }

    #[test]
    fn playback_handshake_advertises_formats() {
        let mut server = playback_server();
        let reply = server.process(&handshake("HANDSHAKE_IMAGE_AND_DEPTH", "2"));
        assert_eq!(reply.pname(), Some("HANDSHAKE_IMAGE_AND_DEPTH"));
        assert_eq!(reply.get("image_format"), Some("jpg"));
        assert_eq!(reply.get("output_format"), Some("pfm"));
        assert_eq!(reply.get("depth_map_type"), Some("inverse"));

        let reply = server.process(&handshake("HANDSHAKE_IMAGE_AND_DEPTH", "9"));
        assert_eq!(reply.pname(), Some("ERROR"));
    }

    #[test]
    fn stopped_stream_reports_not_available() {
        let mut server = playback_server();
        let reply = server.process(&WireMessage::request("IMAGE_AND_DEPTH"));
        assert_eq!(reply.pname(), Some("IMAGE_AND_DEPTH"));
        assert_eq!(reply.get("status"), Some("not_available"));
        assert!(reply.payload().is_empty());
    }

    #[test]
    fn play_fetch_pause_stop_cycle() {
        let mut server = playback_server();

        let mut play = WireMessage::request("IMAGE_AND_DEPTH_REQUEST_PLAY");
        play.set_payload(b"clip.mp4".to_vec());
        let reply = server.process(&play);
        assert_eq!(reply.get("success"), Some("true"));

        let reply = server.process(&WireMessage::request("IMAGE_AND_DEPTH"));
        assert_eq!(reply.get("status"), Some("new"));
        let len_image: usize = reply.get("len_image").unwrap().parse().unwrap();
        let len_depth: usize = reply.get("len_depth").unwrap().parse().unwrap();
        assert_eq!(len_image + len_depth, reply.payload().len());
        assert_eq!(&reply.payload()[..2], [0xff, 0xd8]);
        assert!(reply.payload()[len_image..].starts_with(b"Pf\n2 2\n"));

        // within the 80ms frame interval the served frame is unchanged
        let reply = server.process(&WireMessage::request("IMAGE_AND_DEPTH"));
        assert_eq!(reply.get("status"), Some("not_modified"));
        assert!(reply.payload().is_empty());

        let reply = server.process(&WireMessage::request("IMAGE_AND_DEPTH_REQUEST_PAUSE"));
        assert_eq!(reply.get("success"), Some("true"));
        let reply = server.process(&WireMessage::request("IMAGE_AND_DEPTH"));
        assert_eq!(reply.get("status"), Some("not_modified"));

        let reply = server.process(&WireMessage::request("IMAGE_AND_DEPTH_REQUEST_STOP"));
        assert_eq!(reply.get("success"), Some("true"));
        let reply = server.process(&WireMessage::request("IMAGE_AND_DEPTH"));
        assert_eq!(reply.get("status"), Some("not_available"));
    }

    #[test]
    fn play_media_starts_the_stream_up_front() {
        let mut service = PlaybackService::new(
            Box::new(LumaEstimator::new()),
            Box::new(ScriptedOpener),
            0,
            ServerIdent::new(),
        );
        service.play_media("clip.mp4").unwrap();

        let mut server = service.into_server();
        let reply = server.process(&WireMessage::request("IMAGE_AND_DEPTH"));
        assert_eq!(reply.get("status"), Some("new"));
    }

    #[test]
    fn unopenable_media_fails_the_play_request() {
        let mut server = playback_server();
        let mut play = WireMessage::request("IMAGE_AND_DEPTH_REQUEST_PLAY");
        play.set_payload(b"missing.bad".to_vec());

        let reply = server.process(&play);
        assert_eq!(reply.get("success"), Some("false"));
        let cause = std::str::from_utf8(reply.payload()).unwrap();
        assert!(cause.contains("missing.bad"));
    }

    #[test]
    fn play_without_a_media_path_fails() {
        let mut server = playback_server();
        let reply = server.process(&WireMessage::request("IMAGE_AND_DEPTH_REQUEST_PLAY"));
        assert_eq!(reply.get("success"), Some("false"));

        let mut play = WireMessage::request("IMAGE_AND_DEPTH_REQUEST_PLAY");
        play.set_payload(vec![0xff, 0xfe, 0x00]);
        assert_eq!(server.process(&play).get("success"), Some("false"));
    }

    #[test]
    fn serves_a_client_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut server = compute_server();
            server.serve_next(&listener).unwrap();
        });

        let mut client = WireClient::connect(addr).unwrap();
        let reply = client.request(&handshake("HANDSHAKE_DEPTH", "2")).unwrap();
        assert_eq!(reply.pname(), Some("HANDSHAKE_DEPTH"));

        let reply = client.request(&WireMessage::request("NOPE")).unwrap();
        assert_eq!(reply.pname(), Some("ERROR"));

        drop(client);
        handle.join().unwrap();
    }
}
