use crate::storage::error::{StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Bytes per page, including the slot header.
pub const PAGE_SIZE: usize = 4096;

/// Reads and writes whole pages of a single backing file.
///
/// Page `n` lives at byte offset `n * PAGE_SIZE`; there is no file header.
pub struct PageManager {
    file: File,
    path: PathBuf,
}

impl PageManager {
    /// Creates (or truncates) the backing file.
    pub fn create(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing backing file.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Opens the backing file, creating an empty one if it does not exist yet.
    pub fn open_or_create(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads page `page_no` into `buf`.
    ///
    /// A trailing partial page is zero-filled past the end of the file.
    pub fn read_page(&mut self, page_no: u32, buf: &mut [u8]) -> StorageResult<()> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::invalid(format!(
                "Buffer size must be PAGE_SIZE ({}), got {}",
                PAGE_SIZE,
                buf.len()
            )));
        }

        let num_pages = self.num_pages()?;
        if page_no >= num_pages {
            return Err(StorageError::invalid(format!(
                "Page {} does not exist in {:?} ({} pages)",
                page_no, self.path, num_pages
            )));
        }

        let offset = Self::page_offset(page_no);
        let available = (self.file_len()? - offset).min(PAGE_SIZE as u64) as usize;

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf[..available])?;
        buf[available..].fill(0);

        Ok(())
    }

    /// Writes `data` as page `page_no`, growing the file when needed.
    pub fn write_page(&mut self, page_no: u32, data: &[u8]) -> StorageResult<()> {
        if data.len() != PAGE_SIZE {
            return Err(StorageError::invalid(format!(
                "Data size must be PAGE_SIZE ({}), got {}",
                PAGE_SIZE,
                data.len()
            )));
        }

        let offset = Self::page_offset(page_no);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;

        Ok(())
    }

    /// Appends `data` as a new last page and returns its page number.
    pub fn append_page(&mut self, data: &[u8]) -> StorageResult<u32> {
        let page_no = self.num_pages()?;
        self.write_page(page_no, data)?;
        Ok(page_no)
    }

    /// Number of pages, rounding a trailing partial page up.
    pub fn num_pages(&self) -> StorageResult<u32> {
        let file_size = self.file_len()?;
        Ok(file_size.div_ceil(PAGE_SIZE as u64) as u32)
    }

    fn file_len(&self) -> StorageResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn page_offset(page_no: u32) -> u64 {
        page_no as u64 * PAGE_SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_open() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.dat");

        {
            let pm = PageManager::create(&file_path)?;
            assert_eq!(pm.num_pages()?, 0);
        }

        {
            let pm = PageManager::open(&file_path)?;
            assert_eq!(pm.num_pages()?, 0);
            assert_eq!(pm.path(), file_path.as_path());
        }

        Ok(())
    }

    #[test]
    fn test_write_and_read_page() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("test.dat"))?;

        let mut write_buf = vec![0u8; PAGE_SIZE];
        write_buf[0] = 42;
        write_buf[PAGE_SIZE - 1] = 24;
        pm.write_page(0, &write_buf)?;

        let mut read_buf = vec![0u8; PAGE_SIZE];
        pm.read_page(0, &mut read_buf)?;

        assert_eq!(read_buf[0], 42);
        assert_eq!(read_buf[PAGE_SIZE - 1], 24);

        Ok(())
    }

    #[test]
    fn test_page_boundary() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("test.dat"))?;

        pm.write_page(0, &vec![1u8; PAGE_SIZE])?;
        pm.write_page(1, &vec![2u8; PAGE_SIZE])?;

        let mut read_buf = vec![0u8; PAGE_SIZE];
        pm.read_page(0, &mut read_buf)?;
        assert!(read_buf.iter().all(|&b| b == 1));

        pm.read_page(1, &mut read_buf)?;
        assert!(read_buf.iter().all(|&b| b == 2));

        Ok(())
    }

    #[test]
    fn test_append_page() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("test.dat"))?;

        assert_eq!(pm.append_page(&vec![7u8; PAGE_SIZE])?, 0);
        assert_eq!(pm.append_page(&vec![8u8; PAGE_SIZE])?, 1);
        assert_eq!(pm.num_pages()?, 2);

        Ok(())
    }

    #[test]
    fn test_partial_trailing_page_rounds_up() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("partial.dat");
        std::fs::write(&file_path, vec![9u8; PAGE_SIZE + 10])?;

        let mut pm = PageManager::open(&file_path)?;
        assert_eq!(pm.num_pages()?, 2);

        let mut buf = vec![0xFFu8; PAGE_SIZE];
        pm.read_page(1, &mut buf)?;
        assert!(buf[..10].iter().all(|&b| b == 9));
        assert!(buf[10..].iter().all(|&b| b == 0));

        Ok(())
    }

    #[test]
    fn test_read_nonexistent_page() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("test.dat"))?;

        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            pm.read_page(10, &mut buf),
            Err(StorageError::InvalidArgument(_))
        ));

        Ok(())
    }

    #[test]
    fn test_invalid_buffer_size() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("test.dat"))?;

        let mut small_buf = vec![0u8; 100];
        assert!(pm.read_page(0, &mut small_buf).is_err());
        assert!(pm.write_page(0, &small_buf).is_err());

        Ok(())
    }

    #[test]
    fn test_persistence() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.dat");

        {
            let mut pm = PageManager::create(&file_path)?;
            pm.write_page(0, &vec![99u8; PAGE_SIZE])?;
        }

        {
            let mut pm = PageManager::open_or_create(&file_path)?;
            let mut buf = vec![0u8; PAGE_SIZE];
            pm.read_page(0, &mut buf)?;
            assert_eq!(buf[0], 99);
        }

        Ok(())
    }

    #[test]
    fn test_open_nonexistent_file() -> Result<()> {
        let dir = tempdir()?;
        assert!(PageManager::open(&dir.path().join("missing.dat")).is_err());
        Ok(())
    }
}
