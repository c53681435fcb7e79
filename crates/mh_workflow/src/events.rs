// crates/mh_workflow/src/events.rs

//! 事件系统模块
//!
//! 扫描过程中的里程碑事件及其分发。监听器可能在多个工作线程上同时被调用。

use std::sync::Arc;

use mh_io::ConfigIndex;
use parking_lot::RwLock;

/// 扫描事件
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// 扫描开始
    SweepStarted {
        /// 组合数
        configurations: usize,
        /// 工作线程数
        threads: usize,
    },
    /// 真值就绪（加载或生成）
    TruthReady {
        /// 真值形状
        shape: Vec<usize>,
    },
    /// 任务开始
    JobStarted {
        /// 组合索引
        index: ConfigIndex,
    },
    /// 任务完成
    JobCompleted {
        /// 组合索引
        index: ConfigIndex,
        /// 运行时长 (秒)
        duration_secs: f64,
    },
    /// 任务失败
    JobFailed {
        /// 组合索引
        index: ConfigIndex,
        /// 错误信息
        error: String,
    },
    /// 续跑时跳过已完成的任务
    JobSkipped {
        /// 组合索引
        index: ConfigIndex,
    },
    /// 扫描结束
    SweepFinished {
        /// 完成数
        completed: usize,
        /// 失败数
        failed: usize,
        /// 跳过数
        skipped: usize,
        /// 总时长 (秒)
        duration_secs: f64,
    },
}

impl WorkflowEvent {
    /// 事件对应的组合索引
    pub fn index(&self) -> Option<ConfigIndex> {
        match self {
            Self::JobStarted { index }
            | Self::JobCompleted { index, .. }
            | Self::JobFailed { index, .. }
            | Self::JobSkipped { index } => Some(*index),
            _ => None,
        }
    }

    /// 事件名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::SweepStarted { .. } => "SweepStarted",
            Self::TruthReady { .. } => "TruthReady",
            Self::JobStarted { .. } => "JobStarted",
            Self::JobCompleted { .. } => "JobCompleted",
            Self::JobFailed { .. } => "JobFailed",
            Self::JobSkipped { .. } => "JobSkipped",
            Self::SweepFinished { .. } => "SweepFinished",
        }
    }
}

/// 事件监听器trait
pub trait EventListener: Send + Sync {
    /// 处理事件
    fn on_event(&self, event: &WorkflowEvent);

    /// 获取监听器名称 (用于调试)
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// 函数式事件监听器
pub struct FnListener<F>
where
    F: Fn(&WorkflowEvent) + Send + Sync,
{
    name: String,
    handler: F,
}

impl<F> FnListener<F>
where
    F: Fn(&WorkflowEvent) + Send + Sync,
{
    /// 创建函数式监听器
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> EventListener for FnListener<F>
where
    F: Fn(&WorkflowEvent) + Send + Sync,
{
    fn on_event(&self, event: &WorkflowEvent) {
        (self.handler)(event);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 日志事件监听器
pub struct LoggingListener {
    prefix: String,
}

impl LoggingListener {
    /// 创建日志监听器
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl EventListener for LoggingListener {
    fn on_event(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::SweepStarted {
                configurations,
                threads,
            } => {
                tracing::info!(
                    "{}: sweep started, {} configurations on {} threads",
                    self.prefix,
                    configurations,
                    threads
                );
            }
            WorkflowEvent::TruthReady { shape } => {
                tracing::info!("{}: truth ready {:?}", self.prefix, shape);
            }
            WorkflowEvent::JobStarted { index } => {
                tracing::debug!("{}: config {} started", self.prefix, index);
            }
            WorkflowEvent::JobCompleted {
                index,
                duration_secs,
            } => {
                tracing::info!(
                    "{}: config {} completed in {:.2}s",
                    self.prefix,
                    index,
                    duration_secs
                );
            }
            WorkflowEvent::JobFailed { index, error } => {
                tracing::warn!("{}: config {} failed: {}", self.prefix, index, error);
            }
            WorkflowEvent::JobSkipped { index } => {
                tracing::info!("{}: config {} already completed, skipped", self.prefix, index);
            }
            WorkflowEvent::SweepFinished {
                completed,
                failed,
                skipped,
                duration_secs,
            } => {
                tracing::info!(
                    "{}: sweep finished in {:.2}s ({} completed, {} failed, {} skipped)",
                    self.prefix,
                    duration_secs,
                    completed,
                    failed,
                    skipped
                );
            }
        }
    }

    fn name(&self) -> &str {
        "LoggingListener"
    }
}

/// 事件分发器
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventDispatcher {
    /// 创建新的事件分发器
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// 添加监听器
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        let name = listener.name().to_string();
        self.listeners.write().push(listener);
        tracing::debug!("Added event listener: {}", name);
    }

    /// 添加函数式监听器
    pub fn add_fn_listener<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(FnListener::new(name, handler)));
    }

    /// 分发事件
    pub fn emit(&self, event: WorkflowEvent) {
        let listeners = self.listeners.read();
        tracing::trace!("Emitting event: {}", event.name());
        for listener in listeners.iter() {
            listener.on_event(&event);
        }
    }

    /// 获取监听器数量
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_event_dispatcher() {
        let dispatcher = EventDispatcher::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        dispatcher.add_fn_listener("test", move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.add_listener(Arc::new(LoggingListener::new("sweep")));
        assert_eq!(dispatcher.listener_count(), 2);

        let index = ConfigIndex::new(0, 0, 1);
        dispatcher.emit(WorkflowEvent::JobStarted { index });
        dispatcher.emit(WorkflowEvent::JobCompleted {
            index,
            duration_secs: 1.5,
        });

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_event_index() {
        let index = ConfigIndex::new(1, 2, 3);
        let event = WorkflowEvent::JobFailed {
            index,
            error: "diverged".into(),
        };
        assert_eq!(event.index(), Some(index));
        assert_eq!(event.name(), "JobFailed");
        assert_eq!(WorkflowEvent::TruthReady { shape: vec![600, 1, 49] }.index(), None);
    }
}
