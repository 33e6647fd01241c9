use std::io::Read;
use std::time::Duration;

use crate::shared::frame::Frame;
use crate::stream::domain::frame_source::SourceError;

use super::threaded_frame_source::FrameProducer;

/// Interval between requests when the endpoint serves one image per request.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 16 * 1024;
const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Splits a byte stream into complete JPEG images by their start/end markers.
///
/// Multipart boundaries and part headers between images are skipped, so
/// the exact `multipart/x-mixed-replace` framing does not matter.
pub struct JpegPartReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: Read> JpegPartReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    /// The next complete JPEG, or `None` at end of stream.
    pub fn next_jpeg(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match find(&self.buf, &SOI, 0) {
                Some(start) => {
                    if let Some(end) = find(&self.buf, &EOI, start + 2) {
                        let image = self.buf[start..end + 2].to_vec();
                        self.buf.drain(..end + 2);
                        return Ok(Some(image));
                    }
                }
                None => {
                    // Keep a trailing 0xFF that may begin the next marker.
                    let keep = usize::from(self.buf.last() == Some(&0xFF));
                    let cut = self.buf.len() - keep;
                    self.buf.drain(..cut);
                }
            }
            let n = self.inner.read(&mut chunk)?;
            if n == 0 {
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(2)
        .position(|w| w == needle)
        .map(|i| i + from)
}

fn decode_jpeg(bytes: &[u8], index: usize) -> Result<Frame, SourceError> {
    let image = image::load_from_memory(bytes).map_err(|e| SourceError::Decode(e.to_string()))?;
    Ok(Frame::from_rgb_image(image.to_rgb8(), index))
}

enum Mode {
    Multipart(JpegPartReader<Box<dyn Read + Send>>),
    Poll { pending: Option<Vec<u8>> },
}

/// Consumes a push-style image endpoint.
///
/// A `multipart/*` response is read continuously, one JPEG per part. A
/// plain `image/*` response is treated as a snapshot endpoint and polled.
pub struct MjpegFrameStream {
    client: reqwest::blocking::Client,
    url: String,
    mode: Mode,
    frame_index: usize,
}

impl MjpegFrameStream {
    pub fn connect(url: &str) -> Result<Self, SourceError> {
        // No overall timeout: a multipart response never completes.
        let client = reqwest::blocking::Client::builder()
            .timeout(None)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let response = client.get(url).send()?.error_for_status()?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let mode = if content_type.starts_with("multipart/") {
            Mode::Multipart(JpegPartReader::new(Box::new(response)))
        } else if content_type.starts_with("image/") {
            Mode::Poll {
                pending: Some(response.bytes()?.to_vec()),
            }
        } else {
            return Err(SourceError::UnsupportedContent(content_type));
        };
        log::info!("Connected to image feed {url} ({content_type})");

        Ok(Self {
            client,
            url: url.to_string(),
            mode,
            frame_index: 0,
        })
    }

    fn next_bytes(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        match &mut self.mode {
            Mode::Multipart(reader) => reader.next_jpeg().map_err(|e| SourceError::Decode(e.to_string())),
            Mode::Poll { pending } => match pending.take() {
                Some(bytes) => Ok(Some(bytes)),
                None => {
                    let response = self.client.get(&self.url).send()?.error_for_status()?;
                    Ok(Some(response.bytes()?.to_vec()))
                }
            },
        }
    }
}

impl FrameProducer for MjpegFrameStream {
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let Some(bytes) = self.next_bytes()? else {
            return Ok(None);
        };
        let frame = decode_jpeg(&bytes, self.frame_index)?;
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn pacing(&self) -> Option<Duration> {
        match self.mode {
            Mode::Multipart(_) => None,
            Mode::Poll { .. } => Some(POLL_INTERVAL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::net::TcpListener;
    use std::thread;

    fn jpeg(width: u32, height: u32, value: u8) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([value, value, value]));
        let mut out = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 90)
            .encode_image(&img)
            .unwrap();
        out
    }

    fn multipart(parts: &[Vec<u8>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
            body.extend_from_slice(part);
            body.extend_from_slice(b"\r\n");
        }
        body
    }

    #[test]
    fn test_splits_multipart_body_into_jpegs() {
        let parts = vec![jpeg(8, 8, 10), jpeg(16, 4, 200)];
        let mut reader = JpegPartReader::new(Cursor::new(multipart(&parts)));

        assert_eq!(reader.next_jpeg().unwrap().unwrap(), parts[0]);
        assert_eq!(reader.next_jpeg().unwrap().unwrap(), parts[1]);
        assert!(reader.next_jpeg().unwrap().is_none());
    }

    /// Yields one byte per read, so markers straddle every boundary.
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let end = buf.len().min(1);
            self.0.read(&mut buf[..end])
        }
    }

    #[test]
    fn test_markers_split_across_reads() {
        let part = jpeg(4, 4, 99);
        let mut reader = JpegPartReader::new(Trickle(Cursor::new(multipart(&[part.clone()]))));
        assert_eq!(reader.next_jpeg().unwrap().unwrap(), part);
    }

    #[test]
    fn test_truncated_jpeg_is_end_of_stream() {
        let mut body = multipart(&[jpeg(4, 4, 1)]);
        body.extend_from_slice(&SOI);
        body.extend_from_slice(&[1, 2, 3]);
        let mut reader = JpegPartReader::new(Cursor::new(body));
        assert!(reader.next_jpeg().unwrap().is_some());
        assert!(reader.next_jpeg().unwrap().is_none());
    }

    #[test]
    fn test_decode_jpeg_to_frame() {
        let frame = decode_jpeg(&jpeg(12, 6, 128), 4).unwrap();
        assert_eq!((frame.width(), frame.height(), frame.index()), (12, 6, 4));
    }

    fn serve(content_type: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/video_feed", listener.local_addr().unwrap());
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 1024];
            let _ = std::io::Read::read(&mut stream, &mut request);
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .unwrap();
            stream.write_all(&body).unwrap();
        });
        url
    }

    #[test]
    fn test_multipart_endpoint_streams_frames() {
        let body = multipart(&[jpeg(8, 8, 0), jpeg(8, 8, 255)]);
        let url = serve("multipart/x-mixed-replace; boundary=frame", body);

        let mut stream = MjpegFrameStream::connect(&url).unwrap();
        assert!(stream.pacing().is_none());
        assert_eq!(stream.next_frame().unwrap().unwrap().index(), 0);
        assert_eq!(stream.next_frame().unwrap().unwrap().index(), 1);
        assert!(stream.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_single_image_endpoint_is_polled() {
        let url = serve("image/jpeg", jpeg(8, 8, 50));
        let mut stream = MjpegFrameStream::connect(&url).unwrap();
        assert_eq!(stream.pacing(), Some(POLL_INTERVAL));
        assert_eq!(stream.next_frame().unwrap().unwrap().width(), 8);
    }

    #[test]
    fn test_other_content_rejected() {
        let url = serve("text/html", b"<html></html>".to_vec());
        assert!(matches!(
            MjpegFrameStream::connect(&url).err().unwrap(),
            SourceError::UnsupportedContent(ct) if ct == "text/html"
        ));
    }
}
