use crate::models::SegmentStatus;

/// Whether a worker may pick up a segment currently in `status` with the
/// given `retry_count`. Mirrors the state machine in spec §4.4: a worker
/// must refuse `failed` segments that have exhausted `MAX_RETRIES`.
pub fn is_claimable(status: SegmentStatus, retry_count: i32, max_retries: i32) -> bool {
    match status {
        SegmentStatus::Pending => true,
        SegmentStatus::Failed => retry_count < max_retries,
        SegmentStatus::Processing | SegmentStatus::Completed => false,
    }
}

/// Invariant 7: `temp_clip_path` is null iff status is `pending` or
/// `completed`.
pub fn clip_path_must_be_null(status: SegmentStatus) -> bool {
    matches!(status, SegmentStatus::Pending | SegmentStatus::Completed)
}
