//! # Pager
//!
//! The pager owns the database file handle and a bounded in-memory cache of
//! page buffers. Pages are loaded lazily on first access and written back
//! explicitly via [`Pager::flush`]. There is no eviction: a table that needs
//! more than [`TABLE_MAX_PAGES`] pages is full.

use crate::errors::Error;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, info};

/// Page size 4 kilobytes because it's the same size as a page used in
/// the virtual memory systems of most computer architectures.
pub const PAGE_SIZE: usize = 4096;

pub const TABLE_MAX_PAGES: usize = 100;

/// A raw page buffer. Every page is exactly one B-tree node.
pub type Page = [u8; PAGE_SIZE];

pub struct Pager {
    file: File,
    file_length: u64,
    num_pages: u32,
    pages: [Option<Box<Page>>; TABLE_MAX_PAGES],
}

impl Pager {
    /// Opens the database file, creating it if needed. The file length must
    /// be a whole number of pages.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let file_length = file.metadata()?.len();
        if file_length % PAGE_SIZE as u64 != 0 {
            return Err(err!(
                Storage,
                "Db file is not a whole number of pages. Corrupt file."
            ));
        }
        let num_pages = (file_length / PAGE_SIZE as u64) as u32;
        debug!(path = %path.display(), num_pages, "Opened database file");

        Ok(Pager {
            file,
            file_length,
            num_pages,
            pages: std::array::from_fn(|_| None),
        })
    }

    /// Number of pages the table currently addresses. Grows when a page past
    /// the end is fetched.
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Until we start recycling free pages, new pages always go onto the end
    /// of the database file.
    pub fn allocate(&self) -> u32 {
        self.num_pages
    }

    fn ensure_cached(&mut self, page_num: u32) -> Result<(), Error> {
        if page_num as usize >= TABLE_MAX_PAGES {
            return Err(Error::TableFull);
        }
        if self.pages[page_num as usize].is_none() {
            let mut buf = Box::new([0u8; PAGE_SIZE]);
            let file_pages = (self.file_length / PAGE_SIZE as u64) as u32;
            if page_num < file_pages {
                self.file
                    .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
                self.file.read_exact(&mut buf[..])?;
            }
            self.pages[page_num as usize] = Some(buf);
        }
        if page_num >= self.num_pages {
            self.num_pages = page_num + 1;
        }
        Ok(())
    }

    pub fn get(&mut self, page_num: u32) -> Result<&Page, Error> {
        self.ensure_cached(page_num)?;
        self.pages[page_num as usize]
            .as_deref()
            .ok_or_else(|| err!(Storage, "Memory page {} not found.", page_num))
    }

    pub fn get_mut(&mut self, page_num: u32) -> Result<&mut Page, Error> {
        self.ensure_cached(page_num)?;
        self.pages[page_num as usize]
            .as_deref_mut()
            .ok_or_else(|| err!(Storage, "Memory page {} not found.", page_num))
    }

    /// Writes the cached page back to disk. Flushing a page that was never
    /// fetched is an error.
    pub fn flush(&mut self, page_num: u32) -> Result<(), Error> {
        let page = self.pages[page_num as usize]
            .as_deref()
            .ok_or_else(|| err!(Storage, "Tried to flush unloaded page {}.", page_num))?;

        let offset = page_num as u64 * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page)?;
        if offset + PAGE_SIZE as u64 > self.file_length {
            self.file_length = offset + PAGE_SIZE as u64;
        }
        Ok(())
    }

    /// Drops a cache slot without flushing it. The page number is not
    /// recycled; a leaf merge leaks it.
    pub fn drop_slot(&mut self, page_num: u32) {
        if (page_num as usize) < TABLE_MAX_PAGES {
            self.pages[page_num as usize] = None;
        }
    }

    /// Flushes every populated slot and empties the cache.
    pub fn close(&mut self) -> Result<(), Error> {
        let mut flushed = 0;
        for page_num in 0..TABLE_MAX_PAGES as u32 {
            if self.pages[page_num as usize].is_some() {
                self.flush(page_num)?;
                self.pages[page_num as usize] = None;
                flushed += 1;
            }
        }
        info!(flushed, "Flushed {} pages.", flushed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn open_new_file_has_no_pages() {
        let dir = tempfile::tempdir().unwrap();
        let pager = Pager::open(&dir.path().join("t.db")).unwrap();
        assert_eq!(pager.num_pages(), 0);
        assert_eq!(pager.allocate(), 0);
    }

    #[test]
    fn open_rejects_partial_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&[0u8; 100])
            .unwrap();
        assert!(Pager::open(&path).is_err());
    }

    #[test]
    fn get_past_end_is_zeroed_and_bumps_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(&dir.path().join("t.db")).unwrap();
        let page = pager.get(2).unwrap();
        assert!(page.iter().all(|&b| b == 0));
        assert_eq!(pager.num_pages(), 3);
    }

    #[test]
    fn get_out_of_bounds_is_table_full() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(&dir.path().join("t.db")).unwrap();
        assert!(matches!(
            pager.get(TABLE_MAX_PAGES as u32),
            Err(Error::TableFull)
        ));
    }

    #[test]
    fn flush_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        {
            let mut pager = Pager::open(&path).unwrap();
            pager.get_mut(0).unwrap()[17] = 0xAB;
            pager.flush(0).unwrap();
        }
        let mut pager = Pager::open(&path).unwrap();
        assert_eq!(pager.num_pages(), 1);
        assert_eq!(pager.get(0).unwrap()[17], 0xAB);
    }

    #[test]
    fn flush_unloaded_page_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(&dir.path().join("t.db")).unwrap();
        assert!(pager.flush(0).is_err());
    }

    #[test]
    fn dropped_slot_reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(&dir.path().join("t.db")).unwrap();
        pager.get_mut(0).unwrap()[0] = 9;
        pager.flush(0).unwrap();
        pager.drop_slot(0);
        assert_eq!(pager.get(0).unwrap()[0], 9);
    }
}
