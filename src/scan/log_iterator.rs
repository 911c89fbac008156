//! Log iterator: a lazy, finite, non-restartable pass over `[begin, end)`.
//!
//! Produces each record in ascending address order exactly once, terminating
//! at record boundaries. Pages still in memory are read in place; evicted
//! pages are loaded from the device into iterator-owned buffers. Padding at
//! page tails (null headers) is skipped silently, as are records whose
//! invalid bit is set; tombstones are produced for the caller to inspect.

use std::io;
use std::sync::Arc;

use crate::address::Address;
use crate::allocator::HlogInner;
use crate::constants::PAGE_HEADER_SIZE;
use crate::device::StorageDevice;
use crate::record::{Key, Record, RecordInfo, Value};
use crate::utility::AlignedBuffer;

/// How the iterator stages evicted pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanBufferingMode {
    /// Read each record individually; no page staging
    NoBuffering,
    /// Stage one evicted page at a time
    #[default]
    SinglePage,
    /// Stage the current evicted page and prefetch the next
    DoublePage,
}

/// A record produced by the iterator.
///
/// The key and value borrows are valid until the next
/// [`LogIterator::get_next`] call or iterator disposal.
pub struct LogEntry<'a, K, V> {
    /// Address of this record
    pub address: Address,
    /// Address immediately past this record, at a record boundary
    pub next_address: Address,
    /// Snapshot of the record header
    pub info: RecordInfo,
    /// Borrowed key
    pub key: &'a K,
    /// Borrowed value
    pub value: &'a V,
}

/// Staged copy of one evicted page
struct DiskPage {
    buffer: AlignedBuffer,
    /// Page currently staged, if any
    page: Option<u32>,
}

impl DiskPage {
    fn new(page_size: usize, alignment: usize) -> Self {
        Self {
            buffer: AlignedBuffer::zeroed(page_size, alignment)
                .expect("scan buffer allocation failed"),
            page: None,
        }
    }
}

/// Iterator over the records in `[begin, end)`.
pub struct LogIterator<K: Key, V: Value, D: StorageDevice> {
    hlog: Arc<HlogInner<K, V, D>>,
    /// Address of the most recently returned record
    current_address: Address,
    /// Next address to examine
    next_address: Address,
    end_address: Address,
    mode: ScanBufferingMode,
    /// Staged pages (second slot used for double buffering)
    disk_pages: Vec<DiskPage>,
    /// Scratch buffer for unbuffered record reads
    record_buf: Vec<u8>,
    /// Lazily created runtime for driving device reads
    runtime: Option<tokio::runtime::Runtime>,
    records_returned: u64,
}

impl<K: Key, V: Value, D: StorageDevice> LogIterator<K, V, D> {
    pub(crate) fn new(
        hlog: Arc<HlogInner<K, V, D>>,
        begin: Address,
        end: Address,
        mode: ScanBufferingMode,
        allow_mutable: bool,
    ) -> Self {
        let end_address = if allow_mutable {
            end
        } else {
            std::cmp::min(end, hlog.safe_read_only_address_load())
        };

        let mut begin = std::cmp::max(begin, hlog.begin_address_load());
        if begin.offset() < PAGE_HEADER_SIZE as u32 {
            begin = Address::new(begin.page(), PAGE_HEADER_SIZE as u32);
        }

        let page_size = hlog.page_size;
        let alignment = StorageDevice::alignment(hlog.device.as_ref()).max(4096);
        let disk_pages = match mode {
            ScanBufferingMode::NoBuffering => Vec::new(),
            ScanBufferingMode::SinglePage => vec![DiskPage::new(page_size, alignment)],
            ScanBufferingMode::DoublePage => vec![
                DiskPage::new(page_size, alignment),
                DiskPage::new(page_size, alignment),
            ],
        };

        Self {
            hlog,
            current_address: Address::INVALID,
            next_address: begin,
            end_address,
            mode,
            disk_pages,
            record_buf: vec![0u8; Record::<K, V>::size()],
            runtime: None,
            records_returned: 0,
        }
    }

    /// Address of the most recently returned record
    pub fn current_address(&self) -> Address {
        self.current_address
    }

    /// Next address the iterator will examine; always a record boundary
    pub fn next_address(&self) -> Address {
        self.next_address
    }

    /// End of the scanned range (exclusive)
    pub fn end_address(&self) -> Address {
        self.end_address
    }

    /// Number of records produced so far
    pub fn records_returned(&self) -> u64 {
        self.records_returned
    }

    /// Produce the next record, or `None` once the range is exhausted.
    pub fn get_next(&mut self) -> Option<LogEntry<'_, K, V>> {
        let record_size = Record::<K, V>::size() as u32;
        let page_size = self.hlog.page_size as u32;

        loop {
            let address = self.next_address;
            if address >= self.end_address {
                return None;
            }

            // Records never straddle pages: too little room means the rest of
            // the page is padding.
            if address.offset() + record_size > page_size {
                self.next_address = Self::next_page_start(address);
                continue;
            }

            let record_ptr = match self.record_location(address) {
                Ok(ptr) => ptr,
                Err(_) => {
                    // An unreadable evicted page terminates the scan.
                    self.next_address = self.end_address;
                    return None;
                }
            };

            // SAFETY: record_location returned a pointer to at least
            // record_size readable bytes laid out as a record.
            let info = unsafe {
                RecordInfo::from_control((record_ptr as *const u64).read_unaligned())
            };

            if info.is_null() {
                // Zeroed tail of the page; skip to the next page.
                self.next_address = Self::next_page_start(address);
                continue;
            }

            let after = address.offset() + record_size;
            self.next_address = if after >= page_size {
                Self::next_page_start(address)
            } else {
                Address::new(address.page(), after)
            };

            if info.is_invalid() {
                continue;
            }

            self.current_address = address;
            self.records_returned += 1;

            // SAFETY: offsets are within the record allocation; the borrows
            // live until the next get_next call, which is the documented
            // contract.
            let key = unsafe { &*(record_ptr.add(Record::<K, V>::key_offset()) as *const K) };
            let value = unsafe { &*(record_ptr.add(Record::<K, V>::value_offset()) as *const V) };

            return Some(LogEntry {
                address,
                next_address: self.next_address,
                info,
                key,
                value,
            });
        }
    }

    #[inline]
    fn next_page_start(address: Address) -> Address {
        Address::new(address.page() + 1, PAGE_HEADER_SIZE as u32)
    }

    /// Locate the record bytes for `address`, staging an evicted page if
    /// necessary. Returns a pointer valid until the next call.
    fn record_location(&mut self, address: Address) -> io::Result<*const u8> {
        if address >= self.hlog.head_address_load() {
            // SAFETY: the address is at or above the head, so its page is
            // mapped; the caller of the iterator holds epoch protection.
            if let Some(ptr) = unsafe { self.hlog.record_ptr(address) } {
                return Ok(ptr as *const u8);
            }
            // The page raced out of memory; fall through to a device read.
        }

        match self.mode {
            ScanBufferingMode::NoBuffering => {
                let offset = self.hlog.byte_offset(address);
                let len = self.record_buf.len();
                let device = Arc::clone(&self.hlog.device);
                let buf = &mut self.record_buf;
                Self::block_on_read(&mut self.runtime, device.as_ref(), offset, &mut buf[..len])?;
                Ok(self.record_buf.as_ptr())
            }
            ScanBufferingMode::SinglePage => {
                self.stage_page(0, address.page())?;
                Ok(unsafe { self.disk_pages[0].buffer.as_ptr().add(address.offset() as usize) })
            }
            ScanBufferingMode::DoublePage => {
                let page = address.page();
                let idx = (page % 2) as usize;
                self.stage_page(idx, page)?;
                // Prefetch the successor while the current page is consumed.
                let next_page = page + 1;
                if Address::new(next_page, 0) < self.end_address {
                    let _ = self.stage_page(1 - idx, next_page);
                }
                Ok(unsafe {
                    self.disk_pages[idx].buffer.as_ptr().add(address.offset() as usize)
                })
            }
        }
    }

    /// Load `page` into staging slot `idx` unless it is already there.
    fn stage_page(&mut self, idx: usize, page: u32) -> io::Result<()> {
        if self.disk_pages[idx].page == Some(page) {
            return Ok(());
        }

        let offset = page as u64 * self.hlog.page_size as u64;
        let device = Arc::clone(&self.hlog.device);
        {
            let slot = &mut self.disk_pages[idx];
            slot.page = None;
            Self::block_on_read(
                &mut self.runtime,
                device.as_ref(),
                offset,
                &mut slot.buffer[..],
            )?;
            slot.page = Some(page);
        }
        Ok(())
    }

    fn block_on_read(
        runtime: &mut Option<tokio::runtime::Runtime>,
        device: &D,
        offset: u64,
        buf: &mut [u8],
    ) -> io::Result<()> {
        if runtime.is_none() {
            // Dedicated runtime: scans must work whether or not the caller
            // runs inside a runtime of its own.
            *runtime = Some(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?,
            );
        }
        let rt = runtime.as_ref().expect("runtime initialized above");
        let read = rt.block_on(device.read(offset, buf))?;
        if read < buf.len() {
            buf[read..].fill(0);
        }
        Ok(())
    }
}
