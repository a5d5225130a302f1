//! The controller that mediates every change to the inventory, with its
//! view state and debounced persistence.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use sp_core::{Category, CoreError, CoreResult, Id, Inventory, KeyValueStore};
use sp_fs::{load_inventory, save_inventory, StoreConfig};

const SAVE_FAILED: &str = "Failed to save data. Please try again.";
const LOAD_FAILED: &str = "Failed to load saved data. Starting fresh.";

/// Which screen is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    /// The category list.
    #[default]
    Categories,
    /// The items of the selected category.
    Items,
}

/// Navigation and edit-mode context. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewState {
    /// Current screen.
    pub view: View,
    /// Category whose items are shown, set only in [`View::Items`].
    pub selected_category: Option<Id>,
    /// Item in inline edit mode. At most one at a time.
    pub editing_item: Option<Id>,
}

/// Tone of a transient notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// A transient message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Text to show.
    pub message: String,
    /// Success or error styling.
    pub kind: NoticeKind,
    /// Stamped by the first tick after the notice was raised.
    expires_at: Option<Instant>,
}

/// A destructive action waiting for confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    DeleteCategory(Id),
    DeleteItem(Id),
    DeleteVariant { item: Id, variant: Id },
}

/// A confirmation prompt guarding a destructive action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Prompt heading.
    pub title: String,
    /// Explanation of what will be lost.
    pub message: String,
    /// Action run on confirmation.
    pub action: PendingAction,
}

/// Timing knobs for the controller.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    /// Quiet period before a debounced save fires.
    pub save_delay: Duration,
    /// How long a notice stays visible.
    pub notice_ttl: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for Settings {
    fn from(config: &StoreConfig) -> Self {
        Self {
            save_delay: Duration::from_millis(config.save_delay_ms()),
            notice_ttl: Duration::from_millis(config.notice_ms()),
        }
    }
}

/// Coalesces bursts of edits into one save after a quiet period.
#[derive(Debug, Clone)]
pub struct DebouncedWriter {
    delay: Duration,
    deadline: Option<Instant>,
}

impl DebouncedWriter {
    /// Create a writer with the given quiet period.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Request a save; a newer request supersedes any pending one.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Drop the pending request, if any.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Whether a save is waiting.
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the pending save is due.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` exactly once when the pending save has come due.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Single owner of the inventory and its store. Every mutation goes through
/// here.
#[derive(Debug)]
pub struct Controller<S> {
    store: S,
    inventory: Inventory,
    view: ViewState,
    writer: DebouncedWriter,
    notice: Option<Notice>,
    prompt: Option<Prompt>,
    notice_ttl: Duration,
    revision: u64,
}

impl<S: KeyValueStore> Controller<S> {
    /// Load the inventory from `store`, starting empty when nothing usable is
    /// stored.
    pub fn open(store: S, settings: Settings) -> Self {
        let loaded = load_inventory(&store);
        let mut controller = Self {
            store,
            inventory: loaded.inventory,
            view: ViewState::default(),
            writer: DebouncedWriter::new(settings.save_delay),
            notice: None,
            prompt: None,
            notice_ttl: settings.notice_ttl,
            revision: 0,
        };
        if loaded.recovered_from.is_some() {
            controller.notify(LOAD_FAILED, NoticeKind::Error);
        }
        info!(
            categories = controller.inventory.categories().len(),
            items = controller.inventory.items().len(),
            "inventory loaded"
        );
        controller
    }

    /// The current data model.
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// The current navigation state.
    pub fn view(&self) -> ViewState {
        self.view
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The visible notice, if any.
    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// The open confirmation prompt, if any.
    pub fn prompt(&self) -> Option<&Prompt> {
        self.prompt.as_ref()
    }

    /// Counter bumped on every committed change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether a debounced save is waiting.
    pub fn has_pending_save(&self) -> bool {
        self.writer.is_pending()
    }

    /// The category shown in the items view.
    pub fn selected_category(&self) -> Option<&Category> {
        self.view
            .selected_category
            .and_then(|id| self.inventory.category(id))
    }

    /// Earliest instant at which [`Controller::tick`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let notice = self.notice.as_ref().and_then(|notice| notice.expires_at);
        match (self.writer.deadline(), notice) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Open a category's items.
    pub fn select_category(&mut self, id: Id) -> bool {
        if self.inventory.category(id).is_none() {
            return false;
        }
        self.view = ViewState {
            view: View::Items,
            selected_category: Some(id),
            editing_item: None,
        };
        self.revision += 1;
        true
    }

    /// Return to the category list.
    pub fn back(&mut self) {
        self.view = ViewState::default();
        self.revision += 1;
    }

    /// Put an item into inline edit mode, leaving any other item's edit.
    pub fn start_edit_item(&mut self, id: Id) -> bool {
        let visible = self
            .inventory
            .item(id)
            .is_some_and(|item| Some(item.cat_id) == self.view.selected_category);
        if self.view.view != View::Items || !visible {
            return false;
        }
        self.view.editing_item = Some(id);
        self.revision += 1;
        true
    }

    /// Leave inline edit mode.
    pub fn cancel_edit_item(&mut self) {
        self.view.editing_item = None;
        self.revision += 1;
    }

    /// Add a category.
    pub fn add_category(&mut self, name: &str) -> CoreResult<Id> {
        let result = self.inventory.add_category(name);
        self.commit(result, "Category added!")
    }

    /// Rename a category.
    pub fn rename_category(&mut self, id: Id, name: &str) -> CoreResult<()> {
        let result = self.inventory.rename_category(id, name);
        self.commit(result, "Category updated!")
    }

    /// Delete a category together with its items.
    pub fn delete_category(&mut self, id: Id) -> CoreResult<()> {
        let result = self.inventory.delete_category(id).map(|_| ());
        self.commit(result, "Category deleted")
    }

    /// Add an item to the selected category.
    pub fn add_item(&mut self, name: &str) -> CoreResult<Id> {
        let Some(cat_id) = self.view.selected_category else {
            return Err(CoreError::NotFound("no category selected".into()));
        };
        let result = self.inventory.add_item(cat_id, name);
        self.commit(result, "Item added!")
    }

    /// Rename an item and leave edit mode.
    pub fn rename_item(&mut self, id: Id, name: &str) -> CoreResult<()> {
        let result = self.inventory.rename_item(id, name);
        if result.is_ok() && self.view.editing_item == Some(id) {
            self.view.editing_item = None;
        }
        self.commit(result, "Item updated!")
    }

    /// Delete an item and its variants.
    pub fn delete_item(&mut self, id: Id) -> CoreResult<()> {
        let result = self.inventory.delete_item(id);
        self.commit(result, "Item deleted")
    }

    /// Append a variant, reporting incomplete input.
    pub fn add_variant(&mut self, item_id: Id, color: &str, price: &str, qty: &str) -> CoreResult<Id> {
        let result = self.inventory.add_variant(item_id, color, price, qty);
        self.commit(result, "Variant added!")
    }

    /// Apply an in-place variant edit. Incomplete input is ignored without a
    /// notice so typing is never interrupted; applied edits are saved after
    /// the quiet period.
    pub fn update_variant(
        &mut self,
        item_id: Id,
        variant_id: Id,
        color: &str,
        price: &str,
        qty: &str,
        now: Instant,
    ) -> bool {
        let applied = self
            .inventory
            .update_variant(item_id, variant_id, color, price, qty);
        if applied {
            self.writer.schedule(now);
            self.revision += 1;
            debug!(item = %item_id, variant = %variant_id, "variant edit scheduled");
        }
        applied
    }

    /// Remove a variant.
    pub fn delete_variant(&mut self, item_id: Id, variant_id: Id) -> CoreResult<()> {
        let result = self.inventory.delete_variant(item_id, variant_id);
        self.commit(result, "Variant deleted")
    }

    /// Ask before deleting a category.
    pub fn request_delete_category(&mut self, id: Id) -> bool {
        let Some(category) = self.inventory.category(id) else {
            return false;
        };
        self.prompt = Some(Prompt {
            title: "Delete Category".into(),
            message: format!(
                "This will permanently delete \"{}\" and all its items.",
                category.name
            ),
            action: PendingAction::DeleteCategory(id),
        });
        true
    }

    /// Ask before deleting an item.
    pub fn request_delete_item(&mut self, id: Id) -> bool {
        let Some(item) = self.inventory.item(id) else {
            return false;
        };
        self.prompt = Some(Prompt {
            title: "Delete Item".into(),
            message: format!(
                "This will permanently delete \"{}\" and all its variants.",
                item.name
            ),
            action: PendingAction::DeleteItem(id),
        });
        true
    }

    /// Ask before deleting a variant.
    pub fn request_delete_variant(&mut self, item_id: Id, variant_id: Id) -> bool {
        let Some(variant) = self
            .inventory
            .item(item_id)
            .and_then(|item| item.variants.iter().find(|variant| variant.id == variant_id))
        else {
            return false;
        };
        self.prompt = Some(Prompt {
            title: "Delete Variant".into(),
            message: format!(
                "This will permanently delete the variant (Color: {}).",
                variant.color
            ),
            action: PendingAction::DeleteVariant {
                item: item_id,
                variant: variant_id,
            },
        });
        true
    }

    /// Run the pending destructive action.
    pub fn confirm_prompt(&mut self) -> CoreResult<()> {
        let Some(prompt) = self.prompt.take() else {
            return Ok(());
        };
        match prompt.action {
            PendingAction::DeleteCategory(id) => self.delete_category(id),
            PendingAction::DeleteItem(id) => self.delete_item(id),
            PendingAction::DeleteVariant { item, variant } => self.delete_variant(item, variant),
        }
    }

    /// Discard the pending destructive action.
    pub fn cancel_prompt(&mut self) {
        self.prompt = None;
    }

    /// Advance timers: fire a due debounced save and expire notices.
    pub fn tick(&mut self, now: Instant) {
        if self.writer.take_due(now) && self.persist().is_ok() {
            debug!("debounced save written");
        }
        let ttl = self.notice_ttl;
        let expired = match self.notice.as_mut() {
            Some(notice) => match notice.expires_at {
                Some(expires_at) => now >= expires_at,
                None => {
                    notice.expires_at = Some(now + ttl);
                    false
                }
            },
            None => false,
        };
        if expired {
            self.notice = None;
            self.revision += 1;
        }
    }

    /// Save immediately if a debounced save is waiting.
    pub fn flush(&mut self) -> CoreResult<()> {
        if !self.writer.is_pending() {
            return Ok(());
        }
        self.writer.cancel();
        self.persist()
    }

    fn commit<T>(&mut self, result: CoreResult<T>, success: &str) -> CoreResult<T> {
        match result {
            Ok(value) => {
                self.writer.cancel();
                let saved = self.persist();
                self.sync_view();
                self.revision += 1;
                if saved.is_ok() {
                    self.notify(success, NoticeKind::Success);
                }
                Ok(value)
            }
            Err(err) => {
                if matches!(err, CoreError::Validation(_)) {
                    debug!(reason = err.message(), "change rejected");
                    self.notify(err.message(), NoticeKind::Error);
                }
                Err(err)
            }
        }
    }

    fn persist(&mut self) -> CoreResult<()> {
        let result = save_inventory(&self.store, &self.inventory);
        if let Err(err) = &result {
            warn!(error = %err, "saving inventory failed");
            self.notify(SAVE_FAILED, NoticeKind::Error);
        }
        result
    }

    fn sync_view(&mut self) {
        if self.view.view == View::Items && self.selected_category().is_none() {
            self.view = ViewState::default();
        }
        if let Some(id) = self.view.editing_item {
            if self.inventory.item(id).is_none() {
                self.view.editing_item = None;
            }
        }
    }

    fn notify(&mut self, message: &str, kind: NoticeKind) {
        self.notice = Some(Notice {
            message: message.to_string(),
            kind,
            expires_at: None,
        });
        self.revision += 1;
    }
}
