use std::{
    io,
    io::{Cursor, Seek, SeekFrom, Write},
    mem::size_of,
};

use binrw::{BinRead, Endian};
use zerocopy::{AsBytes, FromBytes, FromZeroes, LittleEndian, U32};

use crate::{
    error::{Error, Result},
    format::Vector3f,
};

/// Set on chunk ids whose payload is compressed.
pub const CHUNK_COMPRESSED: u32 = 0x8000_0000;
/// Longest string accepted by [`ChunkReader::read_string_z`], terminator included.
pub const MAX_STRING_LEN: usize = 256;

#[derive(Clone, Debug, Default, PartialEq, FromBytes, FromZeroes, AsBytes)]
#[repr(C, packed)]
pub struct ChunkDescriptor {
    pub id: U32<LittleEndian>,
    pub size: U32<LittleEndian>,
}

impl ChunkDescriptor {
    pub fn new(id: u32) -> Self { Self { id: U32::new(id), size: U32::new(0) } }

    /// Chunk id with the compression mark removed.
    #[inline]
    pub fn id(&self) -> u32 { self.id.get() & !CHUNK_COMPRESSED }

    #[inline]
    pub fn is_compressed(&self) -> bool { self.id.get() & CHUNK_COMPRESSED != 0 }

    /// Splits `data` into (header, payload, remaining).
    pub fn slice(data: &[u8]) -> Result<(&Self, &[u8], &[u8])> {
        let header = Self::ref_from_prefix(data)
            .ok_or_else(|| Error::malformed("truncated chunk header"))?;
        let start = size_of::<Self>();
        let end = start + header.size.get() as usize;
        if end > data.len() {
            return Err(Error::malformed_chunk(
                format!("chunk size {:#X} exceeds remaining {:#X} bytes", end - start, data.len() - start),
                header.id(),
            ));
        }
        Ok((header, &data[start..end], &data[end..]))
    }

    pub fn write<W, CB>(&self, w: &mut W, mut cb: CB) -> io::Result<()>
    where
        W: Write + Seek,
        CB: FnMut(&mut W) -> io::Result<()>,
    {
        // Skip over the header
        let chunk_pos = w.stream_position()?;
        let data_pos = chunk_pos + size_of::<Self>() as u64;
        w.seek(SeekFrom::Start(data_pos))?;

        // Write the data and determine the size
        cb(w)?;
        let end_pos = w.stream_position()?;
        let size = u32::try_from(end_pos - data_pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "chunk exceeds 4 GiB"))?;

        // Return to the start of the chunk and write the header
        w.seek(SeekFrom::Start(chunk_pos))?;
        let mut out = self.clone();
        out.size.set(size);
        w.write_all(out.as_bytes())?;

        // Seek to the end
        w.seek(SeekFrom::Start(end_pos))?;
        Ok(())
    }
}

/// Writes a chunk with the given id, sizing it after `cb` returns.
pub fn write_chunk<W, CB>(w: &mut W, id: u32, cb: CB) -> io::Result<()>
where
    W: Write + Seek,
    CB: FnMut(&mut W) -> io::Result<()>,
{
    ChunkDescriptor::new(id).write(w, cb)
}

/// Writes a null-terminated string.
pub fn write_string_z<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_all(s.as_bytes())?;
    w.write_all(&[0])
}

/// Bounded cursor over one level of a chunked X-Ray stream.
///
/// `data` is the payload of the chunk this reader was opened on; child
/// chunks are looked up in it. Primitive reads consume bytes between `pos`
/// and `end`, which [`find_chunk`](Self::find_chunk) narrows to a single
/// child's payload.
#[derive(Clone, Debug)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> ChunkReader<'a> {
    pub fn new(data: &'a [u8]) -> Self { Self { data, pos: 0, end: data.len() } }

    /// Full payload of this reader.
    #[inline]
    pub fn data(&self) -> &'a [u8] { self.data }

    /// Bytes left before the current bound.
    #[inline]
    pub fn remaining(&self) -> usize { self.end - self.pos }

    #[inline]
    pub fn is_eof(&self) -> bool { self.pos >= self.end }

    /// Iterates the chunks at this level as (descriptor, payload).
    /// Iteration ends at the first malformed header.
    pub fn children(&self) -> Children<'a> { Children { data: self.data } }

    fn locate(&self, id: u32) -> Option<(&'a ChunkDescriptor, &'a [u8])> {
        self.children().find(|(desc, _)| desc.id() == id)
    }

    /// Scans this level for chunk `id` and restricts subsequent reads to
    /// its payload.
    pub fn find_chunk(&mut self, id: u32) -> bool {
        match self.locate(id) {
            Some((desc, payload)) if !desc.is_compressed() => {
                // Payload is a subslice of `data`
                let start = payload.as_ptr() as usize - self.data.as_ptr() as usize;
                self.pos = start;
                self.end = start + payload.len();
                true
            }
            Some(_) => {
                log::warn!("Skipping compressed chunk {id:#06X}");
                false
            }
            None => false,
        }
    }

    /// Opens chunk `id` as a nested reader.
    pub fn open_chunk(&self, id: u32) -> Option<ChunkReader<'a>> {
        match self.locate(id) {
            Some((desc, payload)) if !desc.is_compressed() => Some(ChunkReader::new(payload)),
            Some(_) => {
                log::warn!("Skipping compressed chunk {id:#06X}");
                None
            }
            None => None,
        }
    }

    /// Opens the `n`-th chunk at this level.
    pub fn open_chunk_by_index(&self, n: usize) -> Option<ChunkReader<'a>> {
        let (desc, payload) = self.children().nth(n)?;
        if desc.is_compressed() {
            log::warn!("Skipping compressed chunk {:#06X}", desc.id());
            return None;
        }
        Some(ChunkReader::new(payload))
    }

    /// Readers for chunks 0, 1, 2, ... until the first absent one.
    pub fn list(&self) -> impl Iterator<Item = ChunkReader<'a>> + '_ {
        (0..).map_while(move |n| self.open_chunk_by_index(n))
    }

    /// Like [`open_chunk`](Self::open_chunk), but a missing or compressed
    /// chunk is an error.
    pub fn require_chunk(&self, id: u32, what: &str) -> Result<ChunkReader<'a>> {
        match self.locate(id) {
            Some((desc, _)) if desc.is_compressed() => Err(Error::UnsupportedFormat(format!(
                "compressed {what} chunk {id:#06X}"
            ))),
            Some((_, payload)) => Ok(ChunkReader::new(payload)),
            None => Err(Error::malformed_chunk(format!("missing {what} chunk"), id)),
        }
    }

    /// Like [`find_chunk`](Self::find_chunk), but absence is an error.
    pub fn expect_chunk(&mut self, id: u32, what: &str) -> Result<()> {
        if self.find_chunk(id) {
            Ok(())
        } else {
            Err(Error::malformed_chunk(format!("missing {what} chunk"), id))
        }
    }

    /// Reads a `u32` from chunk `id`, if present.
    pub fn r_chunk_u32(&mut self, id: u32) -> Result<Option<u32>> {
        if self.find_chunk(id) {
            self.read_u32().map(Some).map_err(|e| e.in_chunk(id))
        } else {
            Ok(None)
        }
    }

    /// Reads a `u16` from chunk `id`, if present.
    pub fn r_chunk_u16(&mut self, id: u32) -> Result<Option<u16>> {
        if self.find_chunk(id) {
            self.read_u16().map(Some).map_err(|e| e.in_chunk(id))
        } else {
            Ok(None)
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::malformed(format!(
                "read of {len:#X} bytes crosses chunk bound ({:#X} left)",
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> { Ok(self.read_array::<1>()?[0]) }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> { Ok(u16::from_le_bytes(self.read_array()?)) }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> { Ok(u32::from_le_bytes(self.read_array()?)) }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> { Ok(i32::from_le_bytes(self.read_array()?)) }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> { Ok(u64::from_le_bytes(self.read_array()?)) }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> { Ok(f32::from_le_bytes(self.read_array()?)) }

    pub fn read_vec3(&mut self) -> Result<Vector3f> {
        Ok(Vector3f { x: self.read_f32()?, y: self.read_f32()?, z: self.read_f32()? })
    }

    /// Reads a fixed-layout record.
    pub fn read_type<T>(&mut self) -> Result<T>
    where T: for<'b> BinRead<Args<'b> = ()> {
        let mut cursor = Cursor::new(&self.data[self.pos..self.end]);
        let value = T::read_options(&mut cursor, Endian::Little, ())?;
        self.pos += cursor.position() as usize;
        Ok(value)
    }

    /// Reads `count` fixed-layout records.
    pub fn read_vec<T>(&mut self, count: usize) -> Result<Vec<T>>
    where T: for<'b> BinRead<Args<'b> = ()> {
        // Guard against absurd counts before allocating
        if count > self.remaining() {
            return Err(Error::malformed(format!(
                "record count {count} exceeds chunk size {:#X}",
                self.remaining()
            )));
        }
        (0..count).map(|_| self.read_type()).collect()
    }

    fn read_z(&mut self, cap: Option<usize>) -> Result<String> {
        let window = &self.data[self.pos..self.end];
        let Some(len) = window.iter().position(|&b| b == 0) else {
            return Err(Error::malformed("unterminated string"));
        };
        if let Some(cap) = cap {
            if len + 1 > cap {
                return Err(Error::malformed(format!(
                    "string of {len} bytes exceeds {cap} byte limit"
                )));
            }
        }
        let bytes = self.read_bytes(len + 1)?;
        Ok(String::from_utf8_lossy(&bytes[..len]).into_owned())
    }

    /// Reads a null-terminated string of at most [`MAX_STRING_LEN`] bytes.
    pub fn read_string_z(&mut self) -> Result<String> { self.read_z(Some(MAX_STRING_LEN)) }

    /// Reads a null-terminated string with no length cap.
    pub fn read_text_z(&mut self) -> Result<String> { self.read_z(None) }

    /// Reads a string used as a join key; names compare case-insensitively.
    pub fn read_name_z(&mut self) -> Result<String> {
        Ok(self.read_string_z()?.to_ascii_lowercase())
    }
}

pub struct Children<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for Children<'a> {
    type Item = (&'a ChunkDescriptor, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        match ChunkDescriptor::slice(self.data) {
            Ok((desc, payload, remain)) => {
                self.data = remain;
                Some((desc, payload))
            }
            Err(e) => {
                log::warn!("Stopping chunk scan: {e}");
                self.data = &[];
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(mut cb: impl FnMut(&mut Cursor<Vec<u8>>) -> io::Result<()>) -> Vec<u8> {
        let mut w = Cursor::new(Vec::new());
        cb(&mut w).unwrap();
        w.into_inner()
    }

    #[test]
    fn find_and_read() {
        let data = build(|w| {
            write_chunk(w, 1, |w| w.write_all(&7u32.to_le_bytes()))?;
            write_chunk(w, 2, |w| {
                w.write_all(&0x1234u16.to_le_bytes())?;
                write_string_z(w, "Bone")
            })
        });
        let mut r = ChunkReader::new(&data);
        assert!(r.find_chunk(2));
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_name_z().unwrap(), "bone");
        assert!(r.is_eof());
        assert!(r.find_chunk(1));
        assert_eq!(r.read_u32().unwrap(), 7);
        assert!(!r.find_chunk(3));
    }

    #[test]
    fn reads_stop_at_chunk_bound() {
        let data = build(|w| {
            write_chunk(w, 1, |w| w.write_all(&[1, 2]))?;
            write_chunk(w, 2, |w| w.write_all(&[3, 4, 5, 6]))
        });
        let mut r = ChunkReader::new(&data);
        assert!(r.find_chunk(1));
        assert!(matches!(r.read_u32(), Err(Error::MalformedContainer { .. })));
        // The failed read consumed nothing
        assert_eq!(r.read_u16().unwrap(), 0x0201);
    }

    #[test]
    fn nested_and_indexed_chunks() {
        let data = build(|w| {
            write_chunk(w, 9, |w| {
                for i in 0..3u32 {
                    write_chunk(w, i, |w| w.write_all(&(i * 10).to_le_bytes()))?;
                }
                Ok(())
            })
        });
        let root = ChunkReader::new(&data);
        let list = root.open_chunk(9).unwrap();
        let values: Vec<u32> = list.list().map(|mut c| c.read_u32().unwrap()).collect();
        assert_eq!(values, [0, 10, 20]);
        assert!(list.open_chunk_by_index(3).is_none());
        assert!(root.open_chunk(4).is_none());
    }

    #[test]
    fn compressed_chunk_is_not_opened() {
        let data = build(|w| write_chunk(w, 5 | CHUNK_COMPRESSED, |w| w.write_all(&[0; 8])));
        let mut r = ChunkReader::new(&data);
        assert!(r.open_chunk(5).is_none());
        assert!(!r.find_chunk(5));
        assert!(matches!(r.require_chunk(5, "test"), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn oversized_chunk_is_malformed() {
        let mut data = ChunkDescriptor::new(1).as_bytes().to_vec();
        data[4] = 0x40;
        data.extend_from_slice(&[0; 4]);
        assert!(ChunkDescriptor::slice(&data).is_err());
        assert!(ChunkReader::new(&data).open_chunk(1).is_none());
    }

    #[test]
    fn string_cap() {
        let long = "a".repeat(MAX_STRING_LEN);
        let data = build(|w| write_string_z(w, &long));
        assert!(ChunkReader::new(&data).read_string_z().is_err());
        assert_eq!(ChunkReader::new(&data).read_text_z().unwrap(), long);
        assert!(ChunkReader::new(b"abc").read_text_z().is_err());
    }
}
