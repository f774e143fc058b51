mod backup;
mod daemon;
mod transfer;

// Backup commands
pub use backup::{
    build_request, run_create, run_delete, run_download, run_list, run_restore, run_show,
    run_verify,
};

// Export / import commands
pub use transfer::{parse_filters, run_export, run_import};

// Scheduled commands
pub use daemon::{run_daemon, run_sweep};
