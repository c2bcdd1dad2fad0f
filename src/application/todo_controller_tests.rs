#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::super::notifier::RecordingNotifier;
    use super::super::shared_list::ListSubscription;
    use super::super::todo_controller::{ControllerConfig, FailureKind, TodoController};
    use super::super::ui_state::{StatusReceiver, UiState};
    use crate::domain::{
        repository::{DeletePolicy, TodoRepository, TodoStream},
        store::StoreError,
        todo::Todo,
    };
    use crate::infrastructure::{memory_store::InMemoryDocumentStore, store_repo::StoreTodoRepository};

    type Repo = StoreTodoRepository<InMemoryDocumentStore>;

    struct Harness {
        store: InMemoryDocumentStore,
        seeder: Repo,
        notifier: Arc<RecordingNotifier>,
        controller: TodoController<Repo>,
    }

    fn harness_with(store: InMemoryDocumentStore, policy: DeletePolicy) -> Harness {
        let notifier = Arc::new(RecordingNotifier::default());
        let repo = StoreTodoRepository::new(store.clone()).with_delete_policy(policy);
        let controller = TodoController::new(repo, notifier.clone(), ControllerConfig::default());
        Harness { seeder: StoreTodoRepository::new(store.clone()), store, notifier, controller }
    }

    fn harness() -> Harness { harness_with(InMemoryDocumentStore::new(), DeletePolicy::Permissive) }

    async fn wait_for_list(sub: &mut ListSubscription, pred: impl Fn(&[Todo]) -> bool) -> Vec<Todo> {
        loop {
            let current = sub.current();
            if pred(&current) { return current; }
            tokio::time::timeout(Duration::from_secs(5), sub.changed())
                .await
                .expect("timed out waiting for list")
                .expect("list closed");
        }
    }

    async fn wait_for_state(rx: &mut StatusReceiver, pred: impl Fn(&UiState) -> bool) -> UiState {
        loop {
            let current = rx.current();
            if pred(&current) { return current; }
            tokio::time::timeout(Duration::from_secs(5), rx.changed())
                .await
                .expect("timed out waiting for state")
                .expect("board closed");
        }
    }

    async fn settle() {
        for _ in 0..20 { tokio::task::yield_now().await; }
    }

    fn find<'a>(todos: &'a [Todo], id: &str) -> Option<&'a Todo> { todos.iter().find(|t| t.id == id) }

    #[tokio::test]
    async fn blank_title_is_ignored_entirely() {
        let h = harness();
        assert!(h.controller.add_todo("", "d", 1, None).is_none());
        assert!(h.controller.add_todo("   ", "d", 1, None).is_none());
        assert_eq!(h.controller.current_state(), UiState::Loading);
        assert!(h.notifier.messages().is_empty());

        let mut list = h.controller.todo_list();
        let todos = wait_for_list(&mut list, |_| true).await;
        assert!(todos.is_empty());
        let mut stream = h.seeder.observe_all().await.unwrap();
        assert!(stream.next().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_todo_appears_in_next_emission() {
        let h = harness_with(InMemoryDocumentStore::new().with_ids(["abc123"]), DeletePolicy::Permissive);
        let mut list = h.controller.todo_list();

        let op = h.controller.add_todo("Buy milk", "", 1, None).unwrap();
        assert_eq!(h.controller.current_state(), UiState::Loading);
        assert_eq!(op.await.unwrap(), "abc123");

        let todos = wait_for_list(&mut list, |t| find(t, "abc123").is_some()).await;
        let todo = find(&todos, "abc123").unwrap();
        assert_eq!(todo.title, "Buy milk");
        assert_eq!(todo.priority, 1);
        assert!(!todo.is_completed);
        assert_eq!(h.controller.current_state(), UiState::Success);
        assert_eq!(h.notifier.messages(), vec!["Task added: Buy milk".to_string()]);
    }

    #[tokio::test]
    async fn completing_moves_task_out_of_pending() {
        let h = harness();
        let mut seeded = Todo::new("Buy milk", "");
        seeded.id = h.seeder.create(&seeded).await.unwrap();
        let id = seeded.id.clone();

        let mut all = h.controller.todo_list();
        let mut pending = h.controller.pending_todos();
        wait_for_list(&mut pending, |t| find(t, &id).is_some()).await;

        h.controller.update_todo_status(&seeded, true).await.unwrap();

        wait_for_list(&mut pending, |t| find(t, &id).is_none()).await;
        let todos = wait_for_list(&mut all, |t| find(t, &id).is_some_and(|t| t.is_completed)).await;
        assert_eq!(find(&todos, &id).unwrap().title, "Buy milk");
        assert_eq!(h.notifier.messages(), vec!["Task marked as completed".to_string()]);
    }

    #[tokio::test]
    async fn update_todo_writes_edited_fields() {
        let h = harness();
        let mut seeded = Todo::new("Buy milk", "");
        seeded.id = h.seeder.create(&seeded).await.unwrap();
        let mut all = h.controller.todo_list();

        let edited = Todo { title: "Buy oat milk".into(), priority: 3, ..seeded.clone() };
        h.controller.update_todo(&edited).await.unwrap();

        let todos = wait_for_list(&mut all, |t| find(t, &seeded.id).is_some_and(|t| t.priority == 3)).await;
        assert_eq!(find(&todos, &seeded.id).unwrap().title, "Buy oat milk");
        assert_eq!(h.notifier.messages(), vec!["Task updated: Buy oat milk".to_string()]);
    }

    #[tokio::test]
    async fn delete_removes_from_both_lists_and_repeat_is_permissive() {
        let h = harness();
        let mut seeded = Todo::new("Buy milk", "");
        seeded.id = h.seeder.create(&seeded).await.unwrap();
        let id = seeded.id.clone();

        let mut all = h.controller.todo_list();
        let mut pending = h.controller.pending_todos();
        wait_for_list(&mut all, |t| find(t, &id).is_some()).await;

        h.controller.delete_todo(&seeded).await.unwrap();
        wait_for_list(&mut all, |t| find(t, &id).is_none()).await;
        wait_for_list(&mut pending, |t| find(t, &id).is_none()).await;

        h.controller.delete_todo(&seeded).await.unwrap();
        assert_eq!(h.controller.current_state(), UiState::Success);
        assert_eq!(h.notifier.messages().len(), 2);
    }

    #[tokio::test]
    async fn repeat_delete_fails_under_strict_policy() {
        let h = harness_with(InMemoryDocumentStore::new(), DeletePolicy::Strict);
        let mut seeded = Todo::new("Buy milk", "");
        seeded.id = h.seeder.create(&seeded).await.unwrap();

        h.controller.delete_todo(&seeded).await.unwrap();
        let err = h.controller.delete_todo(&seeded).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::NotFound);
        assert_eq!(h.controller.current_state(), UiState::Error(err.message.clone()));
        assert_eq!(h.notifier.messages().last().unwrap(), &format!("Error deleting task: {}", err.message));
    }

    #[tokio::test]
    async fn listener_failure_keeps_last_good_list() {
        let h = harness();
        let mut seeded = Todo::new("Buy milk", "");
        seeded.id = h.seeder.create(&seeded).await.unwrap();
        let mut all = h.controller.todo_list();
        wait_for_list(&mut all, |t| t.len() == 1).await;

        h.store.fail_listeners(StoreError::Unavailable("connection reset".into()));

        let mut state = h.controller.ui_state();
        let reported = wait_for_state(&mut state, |s| matches!(s, UiState::Error(_))).await;
        assert_eq!(reported, UiState::Error("store unavailable: connection reset".into()));
        assert_eq!(all.current().len(), 1);
        assert_eq!(all.current()[0].id, seeded.id);
        assert!(h.notifier.messages().contains(&"Error loading tasks: store unavailable: connection reset".to_string()));
    }

    #[tokio::test]
    async fn pending_listener_failure_is_silent() {
        let h = harness();
        let mut pending = h.controller.pending_todos();
        pending.changed().await.unwrap();

        h.store.fail_listeners(StoreError::Closed);
        let mut state = h.controller.ui_state();
        wait_for_state(&mut state, |s| matches!(s, UiState::Error(_))).await;
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn listener_error_clears_on_first_good_emission_after_restart() {
        let h = harness();
        let mut all = h.controller.todo_list();
        all.changed().await.unwrap();

        h.store.fail_listeners(StoreError::Unavailable("blip".into()));
        let mut state = h.controller.ui_state();
        wait_for_state(&mut state, |s| matches!(s, UiState::Error(_))).await;
        drop(all);
        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;
        assert_eq!(h.controller.current_state(), UiState::Error("store unavailable: blip".into()));

        h.seeder.create(&Todo::new("Buy milk", "")).await.unwrap();
        let mut again = h.controller.todo_list();
        wait_for_state(&mut state, |s| *s == UiState::Success).await;
        wait_for_list(&mut again, |t| t.len() == 1).await;
        assert_eq!(h.notifier.messages(), vec!["Error loading tasks: store unavailable: blip".to_string()]);
    }

    #[tokio::test]
    async fn listener_open_failure_reports_and_held_list_resumes() {
        let h = harness();
        h.store.set_outage(Some("offline"));
        let all = h.controller.todo_list();

        let mut state = h.controller.ui_state();
        let reported = wait_for_state(&mut state, |s| matches!(s, UiState::Error(_))).await;
        assert_eq!(reported, UiState::Error("store unavailable: offline".into()));
        assert_eq!(h.notifier.messages(), vec!["Error loading tasks: store unavailable: offline".to_string()]);
        assert!(all.current().is_empty());

        h.store.set_outage(None);
        h.seeder.create(&Todo::new("Buy milk", "")).await.unwrap();
        let todos = all.refresh(Duration::from_secs(5)).await;
        assert_eq!(todos.len(), 1);
        assert_eq!(h.controller.current_state(), UiState::Success);
        assert_eq!(h.store.active_listeners(), 1);
    }

    #[tokio::test]
    async fn write_failure_reports_error() {
        let h = harness();
        h.store.set_outage(Some("offline"));
        let err = h.controller.add_todo("Buy milk", "", 2, None).unwrap().await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Unavailable);
        assert_eq!(h.controller.current_state(), UiState::Error("store unavailable: offline".into()));
        assert_eq!(h.notifier.messages(), vec!["Error adding task: store unavailable: offline".to_string()]);
    }

    #[tokio::test]
    async fn connection_test_succeeds_and_cleans_up() {
        let h = harness();
        h.controller.test_store_connection().await.unwrap();
        assert_eq!(h.controller.current_state(), UiState::Success);
        assert_eq!(h.notifier.messages(), vec!["Connection test completed".to_string()]);
        let mut stream = h.seeder.observe_all().await.unwrap();
        assert!(stream.next().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_operation_still_completes() {
        let h = harness();
        let mut all = h.controller.todo_list();
        drop(h.controller.add_todo("Fire and forget", "", 1, None));
        wait_for_list(&mut all, |t| t.iter().any(|t| t.title == "Fire and forget")).await;
    }

    /// Holds `create` until released.
    struct GatedRepo {
        inner: Repo,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl TodoRepository for GatedRepo {
        async fn observe_all(&self) -> Result<TodoStream> { self.inner.observe_all().await }
        async fn observe_pending(&self) -> Result<TodoStream> { self.inner.observe_pending().await }
        async fn create(&self, todo: &Todo) -> Result<String> {
            self.gate.notified().await;
            self.inner.create(todo).await
        }
        async fn update(&self, todo: &Todo) -> Result<()> { self.inner.update(todo).await }
        async fn delete(&self, todo: &Todo) -> Result<()> { self.inner.delete(todo).await }
        async fn verify_round_trip(&self) -> Result<()> { self.inner.verify_round_trip().await }
    }

    #[tokio::test]
    async fn stale_success_does_not_mask_newer_error() {
        let gate = Arc::new(Notify::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let repo = GatedRepo { inner: StoreTodoRepository::new(InMemoryDocumentStore::new()), gate: gate.clone() };
        let controller = TodoController::new(repo, notifier.clone(), ControllerConfig::default());

        let slow = controller.add_todo("Slow", "", 1, None).unwrap();
        let ghost = Todo { id: "ghost".into(), ..Todo::new("Ghost", "") };
        let err = controller.update_todo(&ghost).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::NotFound);

        gate.notify_one();
        assert!(slow.await.is_ok());
        assert_eq!(controller.current_state(), UiState::Error(err.message));
        assert_eq!(notifier.messages().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_list_lingers_then_tears_down() {
        let h = harness();
        let mut first = h.controller.todo_list();
        first.changed().await.unwrap();
        assert_eq!(h.store.active_listeners(), 1);

        drop(first);
        tokio::time::sleep(Duration::from_secs(4)).await;
        settle().await;
        assert_eq!(h.store.active_listeners(), 1);

        let second = h.controller.todo_list();
        let third = h.controller.todo_list();
        settle().await;
        assert_eq!(h.store.active_listeners(), 1);

        drop(second);
        drop(third);
        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;
        assert_eq!(h.store.active_listeners(), 0);

        let mut again = h.controller.todo_list();
        h.seeder.create(&Todo::new("After restart", "")).await.unwrap();
        wait_for_list(&mut again, |t| t.len() == 1).await;
        assert_eq!(h.store.active_listeners(), 1);
    }
}
