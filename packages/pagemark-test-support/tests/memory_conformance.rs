use pagemark_core::MemoryStore;
use pagemark_test_support::{cascades_run_in_bounded_chunks, oversized_batches_are_rejected};

#[test]
fn memory_store_conforms() {
    pagemark_test_support::run_all(MemoryStore::default);
}

#[test]
fn small_batch_limits_are_honoured() {
    oversized_batches_are_rejected(MemoryStore::with_max_batch_ops(8));
    cascades_run_in_bounded_chunks(MemoryStore::with_max_batch_ops(8));
}
