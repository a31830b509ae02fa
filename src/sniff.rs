//! 内容类型嗅探
//!
//! 按 WHATWG MIME Sniffing 的常见签名从前 512 字节判断内容类型，
//! 判断不出时退化为 `text/plain` 或 `application/octet-stream`。

use std::io::SeekFrom;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::error::StorageError;
use crate::types::SNIFF_LEN;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_HTML: &str = "text/html; charset=utf-8";
const TEXT_XML: &str = "text/xml; charset=utf-8";

/// 需要忽略大小写并以空格或 `>` 结尾的 HTML 起始标签
const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// 精确前缀签名
const PREFIXES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\xFE\xFF", "text/plain; charset=utf-16be"),
    (b"\xFF\xFE", "text/plain; charset=utf-16le"),
    (b"\xEF\xBB\xBF", TEXT_PLAIN),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
    (b"BM", "image/bmp"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"OggS\x00", "application/ogg"),
    (b"ID3", "audio/mpeg"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    (b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    (b"\x00asm", "application/wasm"),
];

/// 从字节前缀判断内容类型，只使用前 512 字节
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    let trimmed = skip_whitespace(data);
    if HTML_TAGS.iter().any(|tag| is_html_tag(trimmed, tag)) {
        return TEXT_HTML;
    }
    if trimmed.starts_with(b"<?xml") {
        return TEXT_XML;
    }

    if let Some(&(_, content_type)) = PREFIXES.iter().find(|(sig, _)| data.starts_with(sig)) {
        return content_type;
    }

    if data.len() >= 14 && &data[..4] == b"RIFF" && &data[8..14] == b"WEBPVP" {
        return "image/webp";
    }

    if data.iter().any(|&b| is_binary(b)) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

fn skip_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|&b| !matches!(b, b'\t' | b'\n' | 0x0C | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

fn is_html_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() <= tag.len() {
        return false;
    }
    let matched = data
        .iter()
        .zip(tag.iter())
        .all(|(d, t)| d.to_ascii_uppercase() == *t);
    matched && matches!(data[tag.len()], b' ' | b'>')
}

fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

/// 读取前缀判断内容类型，并把流恢复到读取前的位置
///
/// 无法获取或恢复位置时返回 [`StorageError::Io`]，此时不应继续上传。
pub async fn read_content_type<R>(reader: &mut R) -> Result<&'static str, StorageError>
where
    R: AsyncRead + AsyncSeek + Unpin + ?Sized,
{
    let start = reader
        .stream_position()
        .await
        .map_err(|e| StorageError::io("stream_position", e))?;

    let mut buffer = Vec::with_capacity(SNIFF_LEN);
    let read = (&mut *reader)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut buffer)
        .await
        .map_err(|e| StorageError::io("sniff_content_type", e));

    // 读取失败也要先尝试复位
    let rewound = reader
        .seek(SeekFrom::Start(start))
        .await
        .map_err(|e| StorageError::io("rewind", e));

    read?;
    rewound?;

    Ok(detect_content_type(&buffer))
}

/// 从当前位置到流末尾的字节数，返回前恢复位置
pub async fn remaining_len<R>(reader: &mut R) -> Result<u64, StorageError>
where
    R: AsyncSeek + Unpin + ?Sized,
{
    let start = reader
        .stream_position()
        .await
        .map_err(|e| StorageError::io("stream_position", e))?;
    let end = reader
        .seek(SeekFrom::End(0))
        .await
        .map_err(|e| StorageError::io("seek_end", e))?;
    reader
        .seek(SeekFrom::Start(start))
        .await
        .map_err(|e| StorageError::io("rewind", e))?;
    Ok(end.saturating_sub(start))
}
