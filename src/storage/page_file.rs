use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;

use super::error::{StorageError, StorageResult};
use super::{PageId, PAGE_SIZE};

/// An open page file: a flat byte stream read and written in whole pages.
///
/// The byte length is always an exact multiple of `PAGE_SIZE`; page `i`
/// occupies bytes `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)`. The handle keeps
/// a cursor used by the sequential block helpers.
pub struct PageFile {
    name: String,
    file: File,
    total_pages: PageId,
    cur_page: PageId,
}

impl PageFile {
    /// Create (or truncate) `path` as a page file holding one zero page.
    pub fn create<P: AsRef<Path>>(path: P) -> StorageResult<()> {
        let path = path.as_ref();
        let mut file =
            File::create(path).map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        let zero_page = [0u8; PAGE_SIZE];
        file.write_all(&zero_page)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        file.sync_all()
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        debug!("created page file {}", path.display());
        Ok(())
    }

    /// Open an existing page file for reading and writing.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<PageFile> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| StorageError::FileNotFound(path.display().to_string()))?;

        let len = file.metadata()?.len();
        let total_pages = (len / PAGE_SIZE as u64) as PageId;

        Ok(PageFile {
            name: path.display().to_string(),
            file,
            total_pages,
            cur_page: 0,
        })
    }

    /// Sync and release the file. Consuming `self` rules out use-after-close.
    pub fn close(self) -> StorageResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Delete a page file by name. The caller is responsible for closing
    /// any handle to it first; see [`PageFile::remove`] for the
    /// close-then-delete path through an open handle.
    pub fn destroy<P: AsRef<Path>>(path: P) -> StorageResult<()> {
        let path = path.as_ref();
        fs::remove_file(path)
            .map_err(|_| StorageError::FileNotFound(path.display().to_string()))?;
        debug!("destroyed page file {}", path.display());
        Ok(())
    }

    /// Close this handle and delete the file it refers to.
    pub fn remove(self) -> StorageResult<()> {
        let PageFile { name, file, .. } = self;
        file.sync_all()?;
        drop(file);
        fs::remove_file(&name).map_err(|_| StorageError::FileNotFound(name))
    }

    /// File name this handle was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of whole pages currently in the file.
    pub fn total_pages(&self) -> PageId {
        self.total_pages
    }

    /// Current cursor position used by the sequential block helpers.
    pub fn block_pos(&self) -> PageId {
        self.cur_page
    }

    /// Flush OS buffers for this file to stable storage.
    pub fn sync(&mut self) -> StorageResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn seek_to(&mut self, page: PageId) -> StorageResult<()> {
        let offset = page as u64 * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Read page `page` into `buf`. The page must already exist.
    pub fn read_page(&mut self, page: PageId, buf: &mut [u8; PAGE_SIZE]) -> StorageResult<()> {
        if page < 0 || page >= self.total_pages {
            return Err(StorageError::NonExistingPage(page));
        }
        self.seek_to(page)?;
        self.file
            .read_exact(buf)
            .map_err(|_| StorageError::NonExistingPage(page))?;
        self.cur_page = page;
        Ok(())
    }

    /// Write `buf` as page `page`, extending the file first if the page
    /// does not exist yet.
    pub fn write_page(&mut self, page: PageId, buf: &[u8; PAGE_SIZE]) -> StorageResult<()> {
        if page < 0 {
            return Err(StorageError::WriteFailed(format!(
                "negative page number {}",
                page
            )));
        }
        if page >= self.total_pages {
            self.ensure_capacity(page + 1)?;
        }
        self.seek_to(page)?;
        self.file
            .write_all(buf)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        self.cur_page = page;
        Ok(())
    }

    /// Append one zero-filled page; the cursor moves to the new last page.
    pub fn append_empty_block(&mut self) -> StorageResult<()> {
        self.file.seek(SeekFrom::End(0))?;
        let zero_page = [0u8; PAGE_SIZE];
        self.file
            .write_all(&zero_page)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        self.total_pages += 1;
        self.cur_page = self.total_pages - 1;
        Ok(())
    }

    /// Append zero pages until the file holds at least `num_pages` pages.
    pub fn ensure_capacity(&mut self, num_pages: PageId) -> StorageResult<()> {
        if num_pages < 0 {
            return Err(StorageError::WriteFailed(format!(
                "invalid capacity {}",
                num_pages
            )));
        }
        while self.total_pages < num_pages {
            self.append_empty_block()?;
        }
        Ok(())
    }

    /// Read page 0.
    pub fn read_first_block(&mut self, buf: &mut [u8; PAGE_SIZE]) -> StorageResult<()> {
        self.read_page(0, buf)
    }

    /// Read the page before the cursor; fails at the first page.
    pub fn read_previous_block(&mut self, buf: &mut [u8; PAGE_SIZE]) -> StorageResult<()> {
        let prev = self.cur_page - 1;
        if prev < 0 {
            return Err(StorageError::NonExistingPage(prev));
        }
        self.read_page(prev, buf)
    }

    /// Read the page at the cursor.
    pub fn read_current_block(&mut self, buf: &mut [u8; PAGE_SIZE]) -> StorageResult<()> {
        self.read_page(self.cur_page, buf)
    }

    /// Read the page after the cursor; fails at the last page.
    pub fn read_next_block(&mut self, buf: &mut [u8; PAGE_SIZE]) -> StorageResult<()> {
        let next = self.cur_page + 1;
        if next >= self.total_pages {
            return Err(StorageError::NonExistingPage(next));
        }
        self.read_page(next, buf)
    }

    /// Read the last page in the file.
    pub fn read_last_block(&mut self, buf: &mut [u8; PAGE_SIZE]) -> StorageResult<()> {
        self.read_page(self.total_pages - 1, buf)
    }

    /// Write the page at the cursor.
    pub fn write_current_block(&mut self, buf: &[u8; PAGE_SIZE]) -> StorageResult<()> {
        self.write_page(self.cur_page, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pf");
        (dir, path)
    }

    #[test]
    fn test_create_writes_one_zero_page() {
        let (_dir, path) = setup();
        PageFile::create(&path).unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), PAGE_SIZE as u64);
        let contents = fs::read(&path).unwrap();
        assert!(contents.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_create_truncates_existing_file() {
        let (_dir, path) = setup();
        fs::write(&path, vec![7u8; 3 * PAGE_SIZE]).unwrap();

        PageFile::create(&path).unwrap();
        let pf = PageFile::open(&path).unwrap();
        assert_eq!(pf.total_pages(), 1);
    }

    #[test]
    fn test_open_nonexistent_file() {
        let (_dir, path) = setup();
        let result = PageFile::open(&path);
        assert!(matches!(result, Err(StorageError::FileNotFound(_))));
    }

    #[test]
    fn test_open_reports_total_pages() {
        let (_dir, path) = setup();
        PageFile::create(&path).unwrap();
        {
            let mut pf = PageFile::open(&path).unwrap();
            pf.ensure_capacity(5).unwrap();
            pf.close().unwrap();
        }

        let pf = PageFile::open(&path).unwrap();
        assert_eq!(pf.total_pages(), 5);
        assert_eq!(pf.block_pos(), 0);
    }

    #[test]
    fn test_read_write_page_roundtrip() {
        let (_dir, path) = setup();
        PageFile::create(&path).unwrap();
        let mut pf = PageFile::open(&path).unwrap();

        let mut page = [0u8; PAGE_SIZE];
        page[0] = 42;
        page[PAGE_SIZE - 1] = 255;
        pf.write_page(0, &page).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        pf.read_page(0, &mut buf).unwrap();
        assert_eq!(buf[0], 42);
        assert_eq!(buf[PAGE_SIZE - 1], 255);
    }

    #[test]
    fn test_write_beyond_end_extends_file() {
        let (_dir, path) = setup();
        PageFile::create(&path).unwrap();
        let mut pf = PageFile::open(&path).unwrap();

        let page = [9u8; PAGE_SIZE];
        pf.write_page(3, &page).unwrap();

        assert_eq!(pf.total_pages(), 4);
        assert_eq!(
            fs::metadata(&path).unwrap().len(),
            4 * PAGE_SIZE as u64
        );

        // The gap pages read back as zeros
        let mut buf = [1u8; PAGE_SIZE];
        pf.read_page(2, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_out_of_bounds() {
        let (_dir, path) = setup();
        PageFile::create(&path).unwrap();
        let mut pf = PageFile::open(&path).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        assert!(matches!(
            pf.read_page(1, &mut buf),
            Err(StorageError::NonExistingPage(1))
        ));
        assert!(matches!(
            pf.read_page(-1, &mut buf),
            Err(StorageError::NonExistingPage(-1))
        ));
    }

    #[test]
    fn test_append_empty_block() {
        let (_dir, path) = setup();
        PageFile::create(&path).unwrap();
        let mut pf = PageFile::open(&path).unwrap();

        pf.append_empty_block().unwrap();
        assert_eq!(pf.total_pages(), 2);
        assert_eq!(pf.block_pos(), 1);

        let mut buf = [1u8; PAGE_SIZE];
        pf.read_page(1, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_ensure_capacity() {
        let (_dir, path) = setup();
        PageFile::create(&path).unwrap();
        let mut pf = PageFile::open(&path).unwrap();

        pf.ensure_capacity(6).unwrap();
        assert_eq!(pf.total_pages(), 6);

        // Already large enough: no change
        pf.ensure_capacity(3).unwrap();
        assert_eq!(pf.total_pages(), 6);
    }

    #[test]
    fn test_sequential_block_helpers() {
        let (_dir, path) = setup();
        PageFile::create(&path).unwrap();
        let mut pf = PageFile::open(&path).unwrap();
        pf.ensure_capacity(3).unwrap();

        for i in 0..3 {
            let mut page = [0u8; PAGE_SIZE];
            page[0] = i as u8 + 1;
            pf.write_page(i, &page).unwrap();
        }

        let mut buf = [0u8; PAGE_SIZE];

        pf.read_first_block(&mut buf).unwrap();
        assert_eq!(buf[0], 1);
        assert_eq!(pf.block_pos(), 0);

        pf.read_next_block(&mut buf).unwrap();
        assert_eq!(buf[0], 2);
        assert_eq!(pf.block_pos(), 1);

        pf.read_current_block(&mut buf).unwrap();
        assert_eq!(buf[0], 2);

        pf.read_previous_block(&mut buf).unwrap();
        assert_eq!(buf[0], 1);
        assert_eq!(pf.block_pos(), 0);

        pf.read_last_block(&mut buf).unwrap();
        assert_eq!(buf[0], 3);
        assert_eq!(pf.block_pos(), 2);
    }

    #[test]
    fn test_sequential_helpers_at_boundaries() {
        let (_dir, path) = setup();
        PageFile::create(&path).unwrap();
        let mut pf = PageFile::open(&path).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        assert!(matches!(
            pf.read_previous_block(&mut buf),
            Err(StorageError::NonExistingPage(_))
        ));
        assert!(matches!(
            pf.read_next_block(&mut buf),
            Err(StorageError::NonExistingPage(_))
        ));
    }

    #[test]
    fn test_write_current_block() {
        let (_dir, path) = setup();
        PageFile::create(&path).unwrap();
        let mut pf = PageFile::open(&path).unwrap();
        pf.ensure_capacity(2).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        pf.read_page(1, &mut buf).unwrap();

        let page = [5u8; PAGE_SIZE];
        pf.write_current_block(&page).unwrap();

        pf.read_page(1, &mut buf).unwrap();
        assert_eq!(buf[0], 5);
    }

    #[test]
    fn test_destroy() {
        let (_dir, path) = setup();
        PageFile::create(&path).unwrap();
        PageFile::destroy(&path).unwrap();
        assert!(!path.exists());

        assert!(matches!(
            PageFile::destroy(&path),
            Err(StorageError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_remove_through_open_handle() {
        let (_dir, path) = setup();
        PageFile::create(&path).unwrap();
        let pf = PageFile::open(&path).unwrap();

        pf.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_file_length_stays_page_multiple() {
        let (_dir, path) = setup();
        PageFile::create(&path).unwrap();
        let mut pf = PageFile::open(&path).unwrap();

        let page = [3u8; PAGE_SIZE];
        pf.write_page(7, &page).unwrap();
        pf.append_empty_block().unwrap();
        pf.close().unwrap();

        let len = fs::metadata(&path).unwrap().len();
        assert_eq!(len % PAGE_SIZE as u64, 0);
    }
}
