use crate::api::types::{Job, JobStatus, JobUpdate, MaintenanceTask, NewJob, Property, TopicData};
use crate::api::{ApiClient, CachedClient};
use crate::cache::{
  CacheLayer, CacheResult, CacheSource, MemoryStorage, NoopStorage, SqliteStorage, StorageBackend,
};
use crate::commands::{CacheCommand, Command, JobCommand, JobsArgs, PmCommand};
use crate::config::Config;
use crate::filter::{paginate, JobFilter};
use crate::selection::SelectionContext;
use crate::sync::{CollectionOptions, Record, SyncedCollection};
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

type Jobs = SyncedCollection<Job, ApiClient, StorageBackend>;
type Tasks = SyncedCollection<MaintenanceTask, ApiClient, StorageBackend>;

/// Main application state
pub struct App {
  /// Application configuration
  config: Config,

  /// REST client
  client: ApiClient,

  /// Cached reference data (properties, rooms, topics)
  reference: CachedClient<StorageBackend>,

  /// Persistent key-value store shared by every cache user
  storage: Arc<StorageBackend>,

  /// Selected property
  selection: SelectionContext<StorageBackend>,

  /// Property given on the command line; used without being persisted
  property_override: Option<String>,
}

impl App {
  pub fn new(config: Config, property_override: Option<String>) -> Result<Self> {
    let client = ApiClient::new(&config)?;
    let storage = Arc::new(open_storage(&config));
    info!(backend = storage.label(), "Cache storage ready");

    let reference = CachedClient::new(client.clone(), cache_layer(&config, &storage));
    let selection = SelectionContext::new(Arc::clone(&storage))
      .with_default(config.default_property.clone());

    Ok(Self {
      config,
      client,
      reference,
      storage,
      selection,
      property_override,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Whoami => return self.whoami().await,
      Command::Topics => return self.topics().await,
      _ => {}
    }

    self.init_selection().await?;

    match command {
      Command::Jobs(args) => self.jobs(args).await,
      Command::Stats { pm } => self.stats(pm).await,
      Command::Properties { refresh } => self.properties(refresh).await,
      Command::Select { property_id } => self.select(&property_id),
      Command::Job(cmd) => self.job(cmd).await,
      Command::Pm(cmd) => self.pm(cmd).await,
      Command::Cache(CacheCommand::Clear) => {
        self.clear_cache();
        Ok(())
      }
      Command::Watch { interval, pm } => self.watch(interval, pm).await,
      Command::Rooms => self.rooms().await,
      Command::Whoami | Command::Topics => Ok(()),
    }
  }

  /// Load the property list and restore the selection against it.
  async fn init_selection(&self) -> Result<()> {
    let properties = match self.reference.get_properties(false).await {
      Ok(result) => {
        print_notice(&result);
        result.data
      }
      Err(e) => {
        warn!(error = %e, "Could not load properties");
        eprintln!("warning: could not load properties: {}", e);
        Vec::new()
      }
    };

    self.selection.initialize(&properties);

    if let Some(id) = &self.property_override {
      if !properties.is_empty() && !properties.iter().any(|p| &p.id == id) {
        return Err(eyre!("Unknown property: {}", id));
      }
    }
    Ok(())
  }

  fn scope(&self) -> Option<String> {
    self
      .property_override
      .clone()
      .or_else(|| self.selection.current())
  }

  fn cache_layer(&self) -> CacheLayer<StorageBackend> {
    cache_layer(&self.config, &self.storage)
  }

  fn jobs_collection(&self, pm: bool) -> Jobs {
    SyncedCollection::new(
      self.client.clone(),
      self.cache_layer(),
      CollectionOptions {
        property_id: self.scope(),
        limit: self.config.jobs.limit,
        filtered: pm,
        check_eligibility: pm && self.config.jobs.check_pm_eligibility,
      },
    )
  }

  fn tasks_collection(&self, pending_only: bool) -> Tasks {
    SyncedCollection::new(
      self.client.clone(),
      self.cache_layer(),
      CollectionOptions {
        property_id: self.scope(),
        limit: self.config.jobs.limit,
        filtered: pending_only,
        check_eligibility: self.config.jobs.check_pm_eligibility,
      },
    )
  }

  async fn jobs(&self, args: JobsArgs) -> Result<()> {
    let jobs = self.jobs_collection(args.pm);
    let result = jobs.load(args.refresh).await;
    print_notice(&result);

    let filter = JobFilter {
      status: args.status,
      priority: args.priority,
      search: args.search,
      defective_only: args.defective,
    };
    let mut matching = filter.apply(&result.data);
    args.sort.sort(&mut matching);
    let page = paginate(&matching, args.page, args.per_page);

    println!("{}", scope_heading(self.selection.current_property(), self.scope()));
    let counts: Vec<String> = args
      .facet
      .unique_values(&result.data)
      .iter()
      .map(|value| format!("{} {}", value, args.facet.count(&result.data, value)))
      .collect();
    if !counts.is_empty() {
      println!("{}", counts.join(" | "));
    }
    println!();

    if page.items.is_empty() {
      println!("No jobs found.");
      return Ok(());
    }

    for job in &page.items {
      println!(
        "{:<10} {:<18} {:<7} {}",
        job.job_id,
        job.status.label(),
        job.priority.as_str(),
        first_line(&job.description)
      );
    }
    println!(
      "\nPage {}/{} ({} matching of {})",
      page.page,
      page.total_pages,
      page.total_items,
      result.data.len()
    );
    Ok(())
  }

  async fn stats(&self, pm: bool) -> Result<()> {
    let jobs = self.jobs_collection(pm);
    let result = jobs.load(false).await;
    print_notice(&result);

    let stats = jobs.stats();
    println!("{}", scope_heading(self.selection.current_property(), self.scope()));
    println!("Total:      {}", stats.total);
    println!("Active:     {}", stats.active);
    println!("Completed:  {}", stats.completed);
    println!("Completion: {:.1}%", stats.completion_rate);
    Ok(())
  }

  async fn properties(&self, refresh: bool) -> Result<()> {
    let result = self.reference.get_properties(refresh).await?;
    print_notice(&result);

    if refresh {
      self.selection.sync_scopes(&result.data);
    }

    let current = self.selection.current();
    for property in &result.data {
      let marker = if current.as_deref() == Some(property.id.as_str()) {
        "*"
      } else {
        " "
      };
      println!("{} {:<10} {}", marker, property.id, property.name);
    }
    if result.data.is_empty() {
      println!("No properties available.");
    }
    Ok(())
  }

  fn select(&self, property_id: &str) -> Result<()> {
    if !self.selection.select(property_id) {
      return Err(eyre!("Unknown property: {}", property_id));
    }
    match self.selection.current_property() {
      Some(p) => println!("Selected {} ({})", p.name, p.id),
      None => println!("Selection cleared"),
    }
    Ok(())
  }

  async fn job(&self, command: JobCommand) -> Result<()> {
    match command {
      JobCommand::Show { job_id } => {
        let job = self.client.get_job(&job_id).await?;
        print_job(&job);
      }
      JobCommand::Create {
        description,
        priority,
        remarks,
        room,
        topic,
        defective,
        pm,
      } => {
        let new_job = NewJob {
          description,
          status: JobStatus::Pending,
          priority,
          remarks,
          is_defective: defective,
          is_preventivemaintenance: pm,
          property_id: self.scope(),
          room_id: room,
          topic_data: topic.map(|title| TopicData {
            title,
            description: None,
          }),
        };
        let job = self.client.create_job(&new_job).await?;
        self.apply_new_job(job.clone()).await;
        println!("Created {}", job.job_id);
        print_job(&job);
      }
      JobCommand::Status { job_id, status } => {
        let job = self.client.update_job_status(&job_id, status).await?;
        self.apply_job_update(job.clone()).await;
        println!("{} is now {}", job.job_id, job.status);
      }
      JobCommand::Edit {
        job_id,
        description,
        remarks,
        priority,
        defective,
      } => {
        let update = JobUpdate {
          description,
          remarks,
          priority,
          is_defective: defective,
          ..Default::default()
        };
        if update.is_empty() {
          return Err(eyre!("Nothing to change"));
        }
        let job = self.client.update_job(&job_id, &update).await?;
        self.apply_job_update(job.clone()).await;
        print_job(&job);
      }
      JobCommand::Delete { job_id } => {
        self.client.delete_job(&job_id).await?;
        for pm in [false, true] {
          let jobs = self.jobs_collection(pm);
          jobs.load(false).await;
          jobs.remove_record(&job_id);
        }
        println!("Deleted {}", job_id);
      }
    }
    Ok(())
  }

  /// Reflect a server-confirmed job change in the locally held collections.
  async fn apply_job_update(&self, job: Job) {
    for pm in [false, true] {
      let jobs = self.jobs_collection(pm);
      jobs.load(false).await;
      if pm && !job.matches_filter() {
        jobs.remove_record(&job.job_id);
      } else {
        jobs.update_record(job.clone());
      }
    }
  }

  /// Add a job created on the server to the collections it belongs to.
  async fn apply_new_job(&self, job: Job) {
    for pm in [false, true] {
      if pm && !job.matches_filter() {
        continue;
      }
      let jobs = self.jobs_collection(pm);
      jobs.load(false).await;
      jobs.insert_record(job.clone());
    }
  }

  async fn pm(&self, command: PmCommand) -> Result<()> {
    match command {
      PmCommand::List { refresh, all } => {
        let tasks = self.tasks_collection(!all);
        let result = tasks.load(refresh).await;
        print_notice(&result);

        println!("{}", scope_heading(self.selection.current_property(), self.scope()));
        println!();
        if result.data.is_empty() {
          println!("No preventive maintenance scheduled.");
        }
        for task in &result.data {
          let scheduled = task
            .scheduled_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
          println!(
            "{:<12} {:<10} {:<10} {}",
            task.pm_id,
            task.status.as_str(),
            scheduled,
            task.frequency.as_deref().unwrap_or("")
          );
        }
      }
      PmCommand::Complete { pm_id, notes } => {
        let task = self
          .client
          .complete_maintenance(&pm_id, notes.as_deref())
          .await?;
        for pending_only in [true, false] {
          let tasks = self.tasks_collection(pending_only);
          tasks.load(false).await;
          if pending_only && !task.matches_filter() {
            tasks.remove_record(&task.pm_id);
          } else {
            tasks.update_record(task.clone());
          }
        }
        println!("{} marked {}", task.pm_id, task.status);
      }
    }
    Ok(())
  }

  fn clear_cache(&self) {
    for pm in [false, true] {
      self.jobs_collection(pm).clear_cache();
      self.tasks_collection(pm).clear_cache();
    }
    self.reference.clear(self.scope().as_deref());
    println!("Cache cleared");
  }

  /// Refresh on a timer until interrupted, following selection changes.
  async fn watch(&self, interval_secs: u64, pm: bool) -> Result<()> {
    let jobs = self.jobs_collection(pm);
    let follower = match self.property_override {
      Some(_) => None,
      None => Some(jobs.follow_selection(self.selection.subscribe())),
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
      tokio::select! {
        _ = ticker.tick() => {}
        _ = tokio::signal::ctrl_c() => break,
      }

      match self.reference.get_properties(true).await {
        Ok(result) => self.selection.sync_scopes(&result.data),
        Err(e) => warn!(error = %e, "Property refresh failed"),
      }

      let result = jobs.load(true).await;
      let stats = jobs.stats();
      let when = chrono::Local::now().format("%H:%M:%S");
      match &result.error {
        Some(e) => println!("[{}] {} jobs ({}) - {}", when, stats.total, result.source.label(), e),
        None => println!(
          "[{}] {} jobs, {} active, {:.1}% complete",
          when, stats.total, stats.active, stats.completion_rate
        ),
      }
    }

    jobs.detach();
    if let Some(handle) = follower {
      handle.abort();
    }
    Ok(())
  }

  async fn whoami(&self) -> Result<()> {
    self.client.health().await?;
    println!("Connected to {}", self.config.api.url);
    let profile = self.client.get_profile().await?;
    println!("{} ({})", profile.username, profile.id);
    if let Some(email) = &profile.email {
      println!("Email:     {}", email);
    }
    if let Some(positions) = &profile.positions {
      println!("Positions: {}", positions);
    }
    for property in &profile.properties {
      println!("  {:<10} {}", property.id, property.name);
    }
    Ok(())
  }

  async fn rooms(&self) -> Result<()> {
    let scope = self.scope();
    let result = self.reference.get_rooms(scope.as_deref()).await?;
    print_notice(&result);
    for room in result.data.iter().filter(|r| r.is_active) {
      println!("{:<10} {:<24} {}", room.room_id, room.name, room.room_type);
    }
    Ok(())
  }

  async fn topics(&self) -> Result<()> {
    let result = self.reference.get_topics().await?;
    print_notice(&result);
    for topic in &result.data {
      println!("{:<8} {}", topic.id, topic.title);
    }
    Ok(())
  }
}

fn open_storage(config: &Config) -> StorageBackend {
  if !config.cache.enabled {
    return StorageBackend::Disabled(NoopStorage);
  }

  let opened = match &config.cache.path {
    Some(path) => SqliteStorage::open_at(path),
    None => SqliteStorage::open(),
  };
  match opened {
    Ok(storage) => StorageBackend::Sqlite(storage),
    Err(e) => {
      warn!(error = %e, "Cache database unavailable, caching in memory only");
      StorageBackend::Memory(MemoryStorage::new())
    }
  }
}

fn cache_layer(config: &Config, storage: &Arc<StorageBackend>) -> CacheLayer<StorageBackend> {
  CacheLayer::new(Arc::clone(storage))
    .with_stale_time(chrono::Duration::minutes(config.cache.stale_minutes))
}

/// Tell the user when data did not come straight from the server.
fn print_notice<T>(result: &CacheResult<T>) {
  if let Some(error) = &result.error {
    eprintln!("warning: {}", error);
    return;
  }
  if let (CacheSource::CacheFresh | CacheSource::CacheStale, Some(at)) =
    (result.source, result.cached_at)
  {
    eprintln!(
      "({} from {}, use --refresh to reload)",
      result.source.label(),
      at.with_timezone(&chrono::Local).format("%H:%M")
    );
  }
}

fn scope_heading(property: Option<Property>, scope: Option<String>) -> String {
  match (property, scope) {
    (Some(p), _) => format!("{} ({})", p.name, p.id),
    (None, Some(id)) => id,
    (None, None) => "All properties".to_string(),
  }
}

fn first_line(text: &str) -> &str {
  text.lines().next().unwrap_or("")
}

fn print_job(job: &Job) {
  println!("{}  [{}]  priority {}", job.job_id, job.status, job.priority);
  println!("{}", job.description);
  if let Some(remarks) = &job.remarks {
    println!("\nRemarks: {}", remarks);
  }
  if !job.rooms.is_empty() {
    let rooms: Vec<&str> = job.rooms.iter().map(|r| r.name.as_str()).collect();
    println!("Rooms:   {}", rooms.join(", "));
  }
  if !job.topics.is_empty() {
    let topics: Vec<&str> = job.topics.iter().map(|t| t.title.as_str()).collect();
    println!("Topics:  {}", topics.join(", "));
  }
  if job.is_defective {
    println!("Defective");
  }
  if job.is_preventivemaintenance {
    println!("Preventive maintenance");
  }
  println!(
    "Created: {}  Updated: {}",
    job.created_at.format("%Y-%m-%d %H:%M"),
    job.updated_at.format("%Y-%m-%d %H:%M")
  );
  if let Some(completed) = job.completed_at {
    println!("Completed: {}", completed.format("%Y-%m-%d %H:%M"));
  }
  if let Some(by) = &job.updated_by {
    println!("Last updated by {}", by);
  }
}
