pub(crate) mod ingest;
pub(crate) mod reconcile;
pub(crate) mod reindex;
pub(crate) mod sweep;
