//! Autosaved profile draft

use futures::FutureExt;
use podium_store::{Backend, ProfileApi, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::debounce::{Debouncer, Writer};
use crate::notice::{NoticeKind, Notices};

/// Editable profile fields held between keystrokes and the backend write
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileDraft {
    pub display_name: String,
}

/// Builds a debouncer that persists the draft's display name for `viewer`.
/// Blank names are not written.
pub fn profile_autosave(
    backend: Arc<dyn Backend>,
    viewer: UserId,
    initial: ProfileDraft,
    delay: Duration,
    notices: Notices,
) -> Debouncer<ProfileDraft> {
    let writer: Writer<ProfileDraft> = Arc::new(move |draft: ProfileDraft| {
        let backend = backend.clone();
        let viewer = viewer.clone();
        let notices = notices.clone();
        async move {
            let name = draft.display_name.trim();
            if name.is_empty() {
                return;
            }
            match backend.update_display_name(&viewer, name).await {
                Ok(()) => info!("Saved display name for {}", viewer),
                Err(e) => {
                    warn!("Autosave of display name failed: {}", e);
                    notices.emit(NoticeKind::AutosaveFailed, "Your profile changes could not be saved");
                }
            }
        }
        .boxed()
    });
    Debouncer::new(initial, delay, writer)
}
