// Application state for HTTP handlers
use crate::application::clean_service::CleanService;
use crate::application::fill_service::FillService;
use crate::application::progress::ProgressTracker;
use crate::application::stream_service::StreamService;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct AppState {
    pub fill_service: FillService,
    pub stream_service: StreamService,
    pub clean_service: CleanService,
    pub progress: Arc<ProgressTracker>,
    busy: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(
        fill_service: FillService,
        stream_service: StreamService,
        clean_service: CleanService,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            fill_service,
            stream_service,
            clean_service,
            progress,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claim the single operation slot. Only one fill/stream/clean runs at
    /// a time; dropping the guard releases the slot.
    pub fn try_claim(&self) -> Option<OperationGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| OperationGuard {
                busy: self.busy.clone(),
            })
    }
}

pub struct OperationGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
