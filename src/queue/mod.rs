use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, BasicRejectOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use rocket::futures::StreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::RabbitMqConfig;
use crate::locks::hold;
use crate::model::api::JobTicket;
use crate::model::error::processing_errors::DispatchError;
use crate::processing::Pipeline;
use crate::repository::{node_repository, Database};

/// Hands processing jobs to a pool of workers. Dispatching claims the file first, so a file
/// can only ever have one job in flight no matter how many times it's dispatched
pub struct ProcessingQueue {
    db: Database,
    next_job_id: AtomicU64,
    transport: Transport,
}

enum Transport {
    /// jobs stay inside this process
    Local {
        sender: UnboundedSender<JobTicket>,
        /// taken by [`ProcessingQueue::start`]
        receiver: Mutex<Option<UnboundedReceiver<JobTicket>>>,
    },
    /// jobs go through a rabbit queue, so they survive restarts and can be spread across servers
    Rabbit(RabbitProvider),
}

struct RabbitProvider {
    /// kept so the connection lives as long as the channel
    #[allow(dead_code)]
    connection: Connection,
    /// the channel that we will be consuming messages from / publishing messages to
    channel: Channel,
    queue: String,
}

impl ProcessingQueue {
    /// a queue that never leaves this process
    pub fn local(db: Database) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            db,
            next_job_id: AtomicU64::new(0),
            transport: Transport::Local {
                sender,
                receiver: Mutex::new(Some(receiver)),
            },
        }
    }

    /// connects to rabbit and declares the job queue
    pub async fn rabbit(db: Database, config: &RabbitMqConfig) -> Result<Self, lapin::Error> {
        let address = config
            .address
            .clone()
            .unwrap_or_else(|| "amqp://127.0.0.1:5672".to_string());
        let connection = Connection::connect(&address, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        // declared here so it exists before anything publishes to or consumes from it
        channel
            .queue_declare(
                &config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        log::info!("Connected to rabbit at {address}, using queue {}", config.queue);
        Ok(Self {
            db,
            next_job_id: AtomicU64::new(0),
            transport: Transport::Rabbit(RabbitProvider {
                connection,
                channel,
                queue: config.queue.clone(),
            }),
        })
    }

    /// Claims the file for processing and queues a job for it, returning as soon as the job is queued.
    ///
    /// Fails with [`DispatchError::AlreadyProcessing`] if another job for the file hasn't finished yet
    pub async fn dispatch(&self, file_id: u32) -> Result<JobTicket, DispatchError> {
        let run = self.claim(file_id)?;
        let ticket = JobTicket {
            job_id: self.next_job_id.fetch_add(1, Ordering::Relaxed) + 1,
            file_id,
            run,
        };
        let sent = match &self.transport {
            Transport::Local { sender, .. } => sender.send(ticket).map_err(|e| e.to_string()),
            Transport::Rabbit(provider) => provider.publish(&ticket).await,
        };
        if let Err(e) = sent {
            log::error!(
                "Failed to queue processing job for file {file_id}. Exception is {e}\n{}",
                Backtrace::force_capture()
            );
            // the claim would otherwise leave the file stuck in processing
            let released = self
                .db
                .open_connection()
                .and_then(|con| node_repository::fail_processing(file_id, run, &con));
            if let Err(e) = released {
                log::error!("Failed to mark file {file_id} as failed. Exception is {e:?}");
            }
            return Err(DispatchError::QueueUnavailable);
        }
        log::debug!("Queued processing job {} for file {file_id}", ticket.job_id);
        Ok(ticket)
    }

    /// claims the file and returns the run number the job has to present to store its results
    fn claim(&self, file_id: u32) -> Result<u32, DispatchError> {
        let con = self.db.open_connection().map_err(|e| {
            log::error!("Failed to open database connection. Exception is {e:?}");
            DispatchError::DbFailure
        })?;
        let node = match node_repository::find_by_id(file_id, &con) {
            Ok(Some(node)) => node,
            Ok(None) => return Err(DispatchError::NotFound),
            Err(e) => {
                log::error!(
                    "Failed to retrieve file {file_id}. Exception is {e:?}\n{}",
                    Backtrace::force_capture()
                );
                return Err(DispatchError::DbFailure);
            }
        };
        if node.is_folder() {
            return Err(DispatchError::NotAFile);
        }
        match node_repository::claim_processing(file_id, &con) {
            Ok(Some(run)) => Ok(run),
            Ok(None) => Err(DispatchError::AlreadyProcessing),
            Err(e) => {
                log::error!(
                    "Failed to claim file {file_id} for processing. Exception is {e:?}\n{}",
                    Backtrace::force_capture()
                );
                Err(DispatchError::DbFailure)
            }
        }
    }

    /// Starts `workers` tasks that run queued jobs through `pipeline`. Must be called from inside the tokio runtime,
    /// and only once
    pub async fn start(&self, pipeline: Pipeline, workers: u16) {
        let workers = workers.max(1);
        match &self.transport {
            Transport::Local { receiver, .. } => {
                let Some(receiver) = hold(receiver).take() else {
                    log::warn!("Processing workers were already started");
                    return;
                };
                let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
                for worker in 0..workers {
                    let receiver = receiver.clone();
                    let pipeline = pipeline.clone();
                    tokio::spawn(async move {
                        loop {
                            let job = receiver.lock().await.recv().await;
                            let Some(job) = job else {
                                break;
                            };
                            log::debug!("Worker {worker} picked up job {}", job.job_id);
                            pipeline.run(job.file_id, job.run).await;
                        }
                        log::info!("Processing worker {worker} stopped");
                    });
                }
            }
            Transport::Rabbit(provider) => provider.consume(pipeline, workers).await,
        }
        log::info!("Started {workers} processing worker(s)");
    }

    /// runs every job queued so far on the current task, instead of waiting for workers
    #[cfg(test)]
    pub async fn run_queued(&self, pipeline: &Pipeline) -> Vec<crate::processing::models::ProcessOutcome> {
        let mut outcomes = Vec::new();
        if let Transport::Local { receiver, .. } = &self.transport {
            loop {
                let job = match hold(receiver).as_mut() {
                    Some(receiver) => receiver.try_recv().ok(),
                    None => None,
                };
                match job {
                    Some(job) => outcomes.push(pipeline.run(job.file_id, job.run).await),
                    None => break,
                }
            }
        }
        outcomes
    }
}

impl RabbitProvider {
    async fn publish(&self, ticket: &JobTicket) -> Result<(), String> {
        let payload = rocket::serde::json::to_string(ticket).map_err(|e| e.to_string())?;
        self.channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload.as_bytes(),
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// sets up long-running consumers that run every job from the rabbit queue through `pipeline`.
    /// Jobs are acked once the run finishes, whatever the outcome, because failures are recorded on the file
    async fn consume(&self, pipeline: Pipeline, workers: u16) {
        if let Err(e) = self
            .channel
            .basic_qos(workers, BasicQosOptions::default())
            .await
        {
            log::warn!("Failed to set rabbit prefetch count. Exception is {e:?}");
        }
        for worker in 0..workers {
            let consumer = self
                .channel
                .basic_consume(
                    &self.queue,
                    &format!("evidence_processing_{worker}"),
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await;
            let mut consumer = match consumer {
                Ok(consumer) => consumer,
                Err(e) => {
                    log::error!("Failed to start rabbit consumer {worker}. Exception is {e:?}");
                    continue;
                }
            };
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                while let Some(delivery) = consumer.next().await {
                    let delivery = match delivery {
                        Ok(delivery) => delivery,
                        Err(e) => {
                            log::error!("Error in rabbit consumer {worker}. Exception is {e:?}");
                            continue;
                        }
                    };
                    let message = String::from_utf8_lossy(&delivery.data);
                    match rocket::serde::json::from_str::<JobTicket>(&message) {
                        Ok(job) => {
                            pipeline.run(job.file_id, job.run).await;
                            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                                log::error!("Failed to ack job {}. Exception is {e:?}", job.job_id);
                            }
                        }
                        Err(e) => {
                            log::error!("Dropping malformed job message {message}. Exception is {e:?}");
                            if let Err(e) = delivery
                                .reject(BasicRejectOptions { requeue: false })
                                .await
                            {
                                log::error!("Failed to reject malformed job. Exception is {e:?}");
                            }
                        }
                    }
                }
                log::info!("Rabbit consumer {worker} stopped");
            });
        }
    }
}
