use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stock_metadata_batch::config::Settings;
use stock_metadata_batch::models::{Generated, LocalizedMetadata};
use stock_metadata_batch::{
    App, Config, Credential, GenerateError, Generator, ItemId, ItemStatus, LogLevel, MediaFile,
    Metadata, Scheduler, SchedulerConfig, SchedulerEvent,
};
use tokio::time::{sleep, Instant};

// ========== 测试用生成器 ==========

/// 一次生成调用的记录
#[derive(Debug, Clone)]
struct Call {
    file: String,
    key: String,
    at: Instant,
}

/// 按文件名预设结果的生成器
///
/// 没有预设结果的调用一律成功。`delay` 模拟网络耗时，`key_delays` 按 Key 覆盖它。
#[derive(Default)]
struct ScriptedGenerator {
    scripts: Mutex<HashMap<String, VecDeque<GenerateError>>>,
    hangs: Mutex<HashSet<String>>,
    delay: Duration,
    key_delays: HashMap<String, Duration>,
    calls: Mutex<Vec<Call>>,
    active: Mutex<HashSet<String>>,
    max_active: Mutex<usize>,
    overlapping_key: Mutex<bool>,
}

impl ScriptedGenerator {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn with_key_delay(mut self, key: &str, delay: Duration) -> Self {
        self.key_delays.insert(key.to_string(), delay);
        self
    }

    /// 让 `file` 的下一次调用永远不返回
    fn hang_next(self, file: &str) -> Self {
        self.hangs.lock().unwrap().insert(file.to_string());
        self
    }

    /// 让 `file` 的下一次调用失败
    fn fail_next(self, file: &str, error: GenerateError) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(file.to_string())
            .or_default()
            .push_back(error);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn call_files(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.file).collect()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        file: &MediaFile,
        _settings: &Settings,
        credential: &Credential,
    ) -> Result<Generated, GenerateError> {
        let key = credential.expose().to_string();
        self.calls.lock().unwrap().push(Call {
            file: file.name.clone(),
            key: key.clone(),
            at: Instant::now(),
        });
        if self.hangs.lock().unwrap().remove(&file.name) {
            std::future::pending::<()>().await;
        }
        {
            let mut active = self.active.lock().unwrap();
            if !active.insert(key.clone()) {
                *self.overlapping_key.lock().unwrap() = true;
            }
            let mut max = self.max_active.lock().unwrap();
            *max = (*max).max(active.len());
        }

        let delay = self.key_delays.get(&key).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            sleep(delay).await;
        }

        self.active.lock().unwrap().remove(&key);

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&file.name)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(err) => Err(err),
            None => Ok(Generated::new(metadata_for(&file.name))),
        }
    }
}

fn metadata_for(name: &str) -> Metadata {
    Metadata {
        en: LocalizedMetadata {
            title: format!("Stock photo {}", name),
            keywords: vec!["stock".to_string(), "photo".to_string()],
        },
        ind: LocalizedMetadata {
            title: format!("Foto stok {}", name),
            keywords: vec!["stok".to_string(), "foto".to_string()],
        },
        category: "Technology".to_string(),
    }
}

fn files(names: &[&str]) -> Vec<MediaFile> {
    names
        .iter()
        .map(|name| MediaFile::new(*name, vec![0xFF, 0xD8, 0xFF]).unwrap())
        .collect()
}

fn scheduler_with(generator: Arc<ScriptedGenerator>, keys: &[&str]) -> Scheduler {
    let scheduler = Scheduler::new(generator, SchedulerConfig::default());
    scheduler.set_credentials(keys.iter().copied());
    scheduler
}

fn status_of(scheduler: &Scheduler, id: ItemId) -> Option<ItemStatus> {
    scheduler.item(id).map(|item| item.status)
}

fn assert_all_completed(scheduler: &Scheduler) {
    for item in scheduler.items() {
        assert_eq!(item.status, ItemStatus::Completed, "{}", item.file.name);
        assert!(item.metadata.is_some());
    }
}

// ========== 调度场景 ==========

#[tokio::test(start_paused = true)]
async fn test_rate_limit_cools_key_and_requeues_to_back() {
    let generator = Arc::new(
        ScriptedGenerator::default()
            .fail_next("a.jpg", GenerateError::RateLimited("429 Too Many Requests".into())),
    );
    let scheduler = scheduler_with(generator.clone(), &["key-1"]);
    scheduler.add_files(files(&["a.jpg", "b.jpg", "c.jpg"]));

    assert!(scheduler.start_processing());
    assert!(scheduler.is_processing());
    scheduler.wait_until_idle().await;

    assert_all_completed(&scheduler);
    assert!(!scheduler.is_processing());

    let calls = generator.calls();
    assert_eq!(
        generator.call_files(),
        vec!["a.jpg", "b.jpg", "c.jpg", "a.jpg"],
        "限流的文件应排到队尾"
    );
    assert!(calls[1].at - calls[0].at >= Duration::from_secs(30));
    assert!(!*generator.overlapping_key.lock().unwrap());

    let logs = scheduler.logs();
    assert_eq!(
        logs.iter()
            .filter(|log| log.level == LogLevel::Warning && log.message.contains("冷却"))
            .count(),
        1
    );
    assert_eq!(logs.last().map(|log| log.level), Some(LogLevel::Success));
}

#[tokio::test(start_paused = true)]
async fn test_start_without_credentials_changes_nothing() {
    let generator = Arc::new(ScriptedGenerator::default());
    let scheduler = scheduler_with(generator.clone(), &[]);
    let ids = scheduler.add_files(files(&["a.jpg", "b.jpg"]));

    assert!(!scheduler.start_processing());
    assert!(!scheduler.is_processing());
    assert!(scheduler.queued().is_empty());
    for id in ids {
        assert_eq!(status_of(&scheduler, id), Some(ItemStatus::Pending));
    }

    let last = scheduler.logs().pop().unwrap();
    assert_eq!(last.level, LogLevel::Error);

    sleep(Duration::from_secs(5)).await;
    assert!(generator.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_permanent_error_fails_item_without_requeue() {
    let unsupported = GenerateError::UnsupportedFormat("b.jpg".into());
    let generator =
        Arc::new(ScriptedGenerator::default().fail_next("b.jpg", unsupported.clone()));
    let scheduler = scheduler_with(generator.clone(), &["key-1", "key-2"]);
    let ids = scheduler.add_files(files(&["a.jpg", "b.jpg", "c.jpg"]));

    assert!(scheduler.start_processing());
    scheduler.wait_until_idle().await;

    let failed = scheduler.item(ids[1]).unwrap();
    assert_eq!(failed.status, ItemStatus::Failed);
    assert_eq!(failed.error, Some(unsupported.to_string()));
    assert_eq!(status_of(&scheduler, ids[0]), Some(ItemStatus::Completed));
    assert_eq!(status_of(&scheduler, ids[2]), Some(ItemStatus::Completed));

    let b_calls = generator
        .call_files()
        .into_iter()
        .filter(|f| f == "b.jpg")
        .count();
    assert_eq!(b_calls, 1);

    let stats = scheduler.stats();
    assert_eq!((stats.completed, stats.failed, stats.processing), (2, 1, 0));
}

#[tokio::test(start_paused = true)]
async fn test_next_run_resets_failed_items() {
    let generator = Arc::new(
        ScriptedGenerator::default().fail_next("a.jpg", GenerateError::Other("boom".into())),
    );
    let scheduler = scheduler_with(generator.clone(), &["key-1"]);
    let ids = scheduler.add_files(files(&["a.jpg"]));

    assert!(scheduler.start_processing());
    scheduler.wait_until_idle().await;
    assert_eq!(status_of(&scheduler, ids[0]), Some(ItemStatus::Failed));

    assert!(scheduler.start_processing());
    scheduler.wait_until_idle().await;
    let item = scheduler.item(ids[0]).unwrap();
    assert_eq!(item.status, ItemStatus::Completed);
    assert_eq!(item.error, None);
}

#[tokio::test(start_paused = true)]
async fn test_key_is_never_used_twice_at_once() {
    let generator = Arc::new(ScriptedGenerator::with_delay(Duration::from_secs(5)));
    let scheduler = scheduler_with(generator.clone(), &["key-1", "key-2"]);
    scheduler.add_files(files(&[
        "1.jpg", "2.jpg", "3.jpg", "4.jpg", "5.jpg", "6.jpg", "7.jpg",
    ]));

    let started = Instant::now();
    assert!(scheduler.start_processing());
    scheduler.wait_until_idle().await;

    assert_all_completed(&scheduler);
    assert!(!*generator.overlapping_key.lock().unwrap());
    assert_eq!(*generator.max_active.lock().unwrap(), 2);
    assert_eq!(generator.calls().len(), 7);

    // 两个 Key 并行：7 个文件需要 4 轮
    assert!(started.elapsed() >= Duration::from_secs(20));
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_key_is_skipped_while_others_continue() {
    let generator = Arc::new(
        ScriptedGenerator::default()
            .fail_next("a.jpg", GenerateError::QuotaExceeded("quota".into())),
    );
    let scheduler = scheduler_with(generator.clone(), &["key-1", "key-2"]);
    scheduler.add_files(files(&["a.jpg", "b.jpg"]));

    assert!(scheduler.start_processing());
    scheduler.wait_until_idle().await;
    assert_all_completed(&scheduler);

    let calls = generator.calls();
    assert_eq!(calls[0].key, "key-1");
    assert!(calls[1..].iter().all(|call| call.key == "key-2"));

    let remaining = scheduler
        .cooldown_remaining(&Credential::from("key-1"))
        .unwrap();
    assert!(remaining > Duration::from_secs(28));
    assert!(remaining <= Duration::from_secs(30));
    assert_eq!(scheduler.cooldown_remaining(&Credential::from("key-2")), None);
}

#[tokio::test(start_paused = true)]
async fn test_retry_item_only_from_terminal_states() {
    let generator = Arc::new(ScriptedGenerator::default());
    let scheduler = scheduler_with(generator.clone(), &["key-1"]);
    let ids = scheduler.add_files(files(&["a.jpg", "b.jpg"]));

    assert!(!scheduler.retry_item(ids[0]), "Pending 不能重试");

    assert!(scheduler.start_processing());
    scheduler.wait_until_idle().await;

    assert!(scheduler.retry_item(ids[0]));
    let item = scheduler.item(ids[0]).unwrap();
    assert_eq!(item.status, ItemStatus::Pending);
    assert!(item.metadata.is_none());
    assert!(!scheduler.retry_item(ids[0]), "重复重试不应生效");
    assert!(scheduler.queued().is_empty(), "重试不会自动入队");
    assert!(!scheduler.retry_item(ItemId(999)));

    assert!(scheduler.start_processing());
    scheduler.wait_until_idle().await;
    assert_eq!(
        generator.call_files(),
        vec!["a.jpg", "b.jpg", "a.jpg"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_delete_item_during_run_discards_late_result() {
    let generator = Arc::new(ScriptedGenerator::with_delay(Duration::from_secs(10)));
    let scheduler = scheduler_with(generator.clone(), &["key-1"]);
    let ids = scheduler.add_files(files(&["a.jpg", "b.jpg", "c.jpg"]));

    assert!(scheduler.start_processing());
    sleep(Duration::from_secs(1)).await;
    assert_eq!(status_of(&scheduler, ids[0]), Some(ItemStatus::Processing));

    assert!(scheduler.delete_item(ids[0]));
    assert!(!scheduler.delete_item(ids[0]));
    scheduler.wait_until_idle().await;

    assert_eq!(scheduler.item(ids[0]).map(|i| i.id), None);
    assert_eq!(scheduler.items().len(), 2);
    assert_all_completed(&scheduler);
    assert_eq!(generator.call_files(), vec!["a.jpg", "b.jpg", "c.jpg"]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_workers_but_lets_in_flight_call_land() {
    let generator = Arc::new(ScriptedGenerator::with_delay(Duration::from_secs(5)));
    let scheduler = scheduler_with(generator.clone(), &["key-1"]);
    let ids = scheduler.add_files(files(&["a.jpg", "b.jpg", "c.jpg"]));

    assert!(scheduler.start_processing());
    sleep(Duration::from_secs(1)).await;

    assert!(scheduler.cancel());
    assert!(!scheduler.cancel());
    assert!(!scheduler.is_processing());
    assert!(scheduler.queued().is_empty());

    sleep(Duration::from_secs(10)).await;
    assert_eq!(status_of(&scheduler, ids[0]), Some(ItemStatus::Completed));
    assert_eq!(status_of(&scheduler, ids[1]), Some(ItemStatus::Pending));
    assert_eq!(status_of(&scheduler, ids[2]), Some(ItemStatus::Pending));
    assert_eq!(generator.calls().len(), 1);

    assert!(scheduler.start_processing());
    scheduler.wait_until_idle().await;
    assert_all_completed(&scheduler);
}

#[tokio::test(start_paused = true)]
async fn test_clear_all_during_run() {
    let generator = Arc::new(ScriptedGenerator::with_delay(Duration::from_secs(10)));
    let scheduler = scheduler_with(generator.clone(), &["key-1"]);
    scheduler.add_files(files(&["a.jpg", "b.jpg"]));

    assert!(scheduler.start_processing());
    sleep(Duration::from_secs(1)).await;

    scheduler.clear_all();
    assert!(!scheduler.is_processing());
    assert!(scheduler.items().is_empty());
    scheduler.wait_until_idle().await;

    // 旧批次的调用结束后也不会留下任何东西
    sleep(Duration::from_secs(20)).await;
    assert!(scheduler.items().is_empty());
    assert_eq!(generator.calls().len(), 1);

    let ids = scheduler.add_files(files(&["c.jpg"]));
    assert!(scheduler.start_processing());
    scheduler.wait_until_idle().await;
    assert_eq!(status_of(&scheduler, ids[0]), Some(ItemStatus::Completed));
}

#[tokio::test(start_paused = true)]
async fn test_second_start_while_running_is_rejected() {
    let generator = Arc::new(ScriptedGenerator::with_delay(Duration::from_secs(3)));
    let scheduler = scheduler_with(generator.clone(), &["key-1"]);
    scheduler.add_files(files(&["a.jpg", "b.jpg"]));

    assert!(scheduler.start_processing());
    assert!(!scheduler.start_processing());
    scheduler.wait_until_idle().await;

    assert_eq!(generator.calls().len(), 2);
    // 没有待处理文件时不会启动
    assert!(!scheduler.start_processing());
}

#[tokio::test(start_paused = true)]
async fn test_events_report_status_changes() {
    let generator = Arc::new(ScriptedGenerator::default());
    let scheduler = scheduler_with(generator, &["key-1"]);
    let ids = scheduler.add_files(files(&["a.jpg"]));
    let mut events = scheduler.subscribe();

    assert!(scheduler.start_processing());
    scheduler.wait_until_idle().await;

    let mut statuses = Vec::new();
    let mut logs = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            SchedulerEvent::ItemChanged { id, status } if id == ids[0] => statuses.push(status),
            SchedulerEvent::ItemChanged { .. } => {}
            SchedulerEvent::Log(_) => logs += 1,
        }
    }
    assert_eq!(statuses, vec![ItemStatus::Processing, ItemStatus::Completed]);
    assert!(logs >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_hung_call_times_out_and_requeues() {
    let generator = Arc::new(ScriptedGenerator::default().hang_next("a.jpg"));
    let scheduler = Scheduler::new(
        generator.clone(),
        SchedulerConfig {
            request_timeout: Duration::from_secs(20),
            ..SchedulerConfig::default()
        },
    );
    scheduler.set_credentials(["key-1"]);
    scheduler.add_files(files(&["a.jpg", "b.jpg"]));

    assert!(scheduler.start_processing());
    sleep(Duration::from_secs(19)).await;
    assert!(scheduler.is_processing());
    assert!(scheduler.queued().contains(&ItemId(2)));

    scheduler.wait_until_idle().await;
    assert_all_completed(&scheduler);

    let calls = generator.calls();
    assert_eq!(generator.call_files(), vec!["a.jpg", "b.jpg", "a.jpg"]);
    // 超时 20 秒 + 冷却 30 秒
    assert!(calls[1].at - calls[0].at >= Duration::from_secs(50));
    assert!(scheduler
        .logs()
        .iter()
        .any(|log| log.level == LogLevel::Warning && log.message.contains("超过 20 秒未返回")));
}

#[tokio::test(start_paused = true)]
async fn test_run_waits_for_requeue_after_other_worker_drained() {
    let generator = Arc::new(
        ScriptedGenerator::default()
            .with_key_delay("key-1", Duration::from_secs(10))
            .with_key_delay("key-2", Duration::from_secs(1))
            .fail_next("a.jpg", GenerateError::RateLimited("429".into())),
    );
    let scheduler = scheduler_with(generator.clone(), &["key-1", "key-2"]);
    let ids = scheduler.add_files(files(&["a.jpg", "b.jpg"]));

    let started = Instant::now();
    assert!(scheduler.start_processing());

    // b 已完成、其他 worker 都已因队列为空退出，a 的调用还在进行
    sleep(Duration::from_secs(5)).await;
    assert_eq!(status_of(&scheduler, ids[1]), Some(ItemStatus::Completed));
    assert_eq!(status_of(&scheduler, ids[0]), Some(ItemStatus::Processing));
    assert!(scheduler.queued().is_empty());
    assert!(scheduler.is_processing());

    scheduler.wait_until_idle().await;
    assert_all_completed(&scheduler);
    assert!(started.elapsed() >= Duration::from_secs(11));

    let keys: Vec<String> = generator.calls().into_iter().map(|c| c.key).collect();
    assert_eq!(keys, vec!["key-1", "key-2", "key-2"]);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_cancel_adopts_in_flight_calls() {
    let generator = Arc::new(
        ScriptedGenerator::default()
            .with_key_delay("slow", Duration::from_secs(60))
            .with_key_delay("fast", Duration::from_secs(5)),
    );
    let scheduler = scheduler_with(generator.clone(), &["slow", "fast"]);
    let ids = scheduler.add_files(files(&["a.jpg", "b.jpg", "c.jpg"]));

    assert!(scheduler.start_processing());
    sleep(Duration::from_secs(1)).await;
    assert!(scheduler.cancel());

    assert!(scheduler.start_processing());
    scheduler.wait_until_idle().await;

    assert!(!scheduler.is_processing());
    assert_all_completed(&scheduler);
    assert_eq!(scheduler.stats().processing, 0);
    assert_eq!(status_of(&scheduler, ids[0]), Some(ItemStatus::Completed));
    assert_eq!(generator.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_late_exhaustion_from_cancelled_run_joins_new_run() {
    let generator = Arc::new(
        ScriptedGenerator::default()
            .with_key_delay("slow", Duration::from_secs(60))
            .with_key_delay("fast", Duration::from_secs(5))
            .fail_next("a.jpg", GenerateError::QuotaExceeded("quota".into())),
    );
    let scheduler = scheduler_with(generator.clone(), &["slow", "fast"]);
    let ids = scheduler.add_files(files(&["a.jpg", "b.jpg", "c.jpg"]));

    assert!(scheduler.start_processing());
    sleep(Duration::from_secs(1)).await;
    assert!(scheduler.cancel());

    assert!(scheduler.start_processing());
    scheduler.wait_until_idle().await;

    assert_all_completed(&scheduler);
    let a_calls: Vec<Call> = generator
        .calls()
        .into_iter()
        .filter(|call| call.file == "a.jpg")
        .collect();
    assert_eq!(a_calls.len(), 2);
    assert_eq!(a_calls[0].key, "slow");
    assert_eq!(a_calls[1].key, "fast");
    assert_eq!(status_of(&scheduler, ids[0]), Some(ItemStatus::Completed));
}

// ========== 命令行应用 ==========

#[tokio::test]
async fn test_app_run_exports_csv() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    std::fs::create_dir_all(&input).unwrap();
    std::fs::write(input.join("a.jpg"), [0xFF, 0xD8, 0xFF]).unwrap();
    std::fs::write(input.join("b.png"), [0x89, 0x50, 0x4E, 0x47]).unwrap();
    std::fs::write(input.join("notes.txt"), "not media").unwrap();

    let config = Config {
        api_keys: vec!["key-1".to_string()],
        input_folder: input.to_string_lossy().to_string(),
        output_folder: dir.path().join("output").to_string_lossy().to_string(),
        ..Config::default()
    };
    let generator = Arc::new(ScriptedGenerator::default());
    let app = App::with_scheduler_config(
        config,
        generator.clone(),
        SchedulerConfig {
            completion_grace: Duration::from_millis(10),
            ..SchedulerConfig::default()
        },
    );

    let exported = app.run().await.unwrap();
    assert_eq!(exported.len(), 2);
    assert_eq!(generator.call_files(), vec!["a.jpg", "b.png"]);

    let english = std::fs::read_to_string(&exported[0]).unwrap();
    assert!(english.starts_with("Filename,Title,Keywords,Category\n"));
    assert!(english.contains("a.jpg,Stock photo a.jpg,\"stock, photo\",19"));
    assert!(english.contains("b.png,"));

    let indonesian = std::fs::read_to_string(&exported[1]).unwrap();
    assert!(indonesian.contains("Foto stok a.jpg"));
}

#[tokio::test]
async fn test_app_run_without_media_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        api_keys: vec!["key-1".to_string()],
        input_folder: dir.path().to_string_lossy().to_string(),
        output_folder: dir.path().join("output").to_string_lossy().to_string(),
        ..Config::default()
    };
    let generator = Arc::new(ScriptedGenerator::default());
    let app = App::new(config, generator.clone());

    assert!(app.run().await.unwrap().is_empty());
    assert!(generator.calls().is_empty());
    assert!(!dir.path().join("output").exists());
}

#[tokio::test]
async fn test_app_run_without_keys_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.jpg"), [0xFF]).unwrap();
    let config = Config {
        input_folder: dir.path().to_string_lossy().to_string(),
        ..Config::default()
    };
    let app = App::new(config, Arc::new(ScriptedGenerator::default()));

    tokio_test::assert_err!(app.run().await);
    assert_eq!(app.scheduler().items()[0].status, ItemStatus::Pending);
}
