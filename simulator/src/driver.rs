use std::fs;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use sqlite_broker::{
    BatchOperation, BatchRequest, Broker, BrokerOptions, CellValue, ErrorKind, OpenRequest,
    OptionsUpdate, QueryEncoding, SessionId, SqlCommand,
};

use crate::args::SimConfig;
use crate::logging::EventLog;
use crate::model::{Caller, Expect, Op, Pending, PendingReply, Slot, Submitted};
use crate::oracle::{Oracle, count_of, resolve};
use crate::scheduler::Scheduler;

const CREATE_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS log (id INTEGER PRIMARY KEY, caller INTEGER, hits INTEGER NOT NULL DEFAULT 0)";
const INSERT: &str = "INSERT INTO log (caller) VALUES (?)";
const TOUCH: &str = "UPDATE log SET hits = hits + 1";
const COUNT: &str = "SELECT count(*) AS n FROM log WHERE id > ?";

struct Sim {
    broker: Broker,
    slots: Vec<Slot>,
    callers: Vec<Caller>,
    oracle: Oracle,
    map_list: bool,
}

pub(crate) fn run(config: SimConfig, rng: &mut ChaCha8Rng) -> Result<(), String> {
    fs::create_dir_all(&config.dir)
        .map_err(|err| format!("failed to create {}: {err}", config.dir.display()))?;
    let mut slots = vec![Slot::new(None)];
    for index in 1..config.slots() {
        let path = config.dir.join(format!("slot{index}.db"));
        // start from an empty file so row ids are predictable
        let _ = fs::remove_file(&path);
        slots.push(Slot::new(Some(path)));
    }

    let map_list = config.encoding == QueryEncoding::MapList;
    let mut sim = Sim {
        broker: BrokerOptions::builder()
            .databases_path(&config.dir)
            .query_as_map_list(map_list)
            .build(),
        slots,
        callers: (0..config.callers).map(|_| Caller::default()).collect(),
        oracle: Oracle::default(),
        map_list,
    };
    let mut scheduler = Scheduler::new(config.callers);
    let mut events = EventLog::new(config.first_steps, config.tail_steps);

    let max_steps = config.iterations.unwrap_or(u64::MAX);
    let max_time = config.duration_ms.unwrap_or(u64::MAX);

    let mut step: u64 = 0;
    while step < max_steps && scheduler.now_ms <= max_time {
        let Some(caller) = scheduler.next(rng) else {
            break;
        };
        let op = next_op(&sim.callers[caller], sim.slots.len(), &config, rng);
        match sim.apply(caller, op) {
            Ok(label) => {
                events.record(format!(
                    "step={step} time={}ms caller={caller} op={op:?} {label}",
                    scheduler.now_ms
                ));
            }
            Err(reason) => {
                events.dump_failure(&reason);
                return Err(reason);
            }
        }
        if let Op::Sleep(ms) = op {
            scheduler.sleep(caller, ms);
        } else {
            scheduler.resume(caller);
        }

        if let Err(reason) = Oracle::check_registry(&sim.slots, &sim.broker.registry_snapshot()) {
            events.dump_failure(&reason);
            return Err(reason);
        }
        scheduler.tick();
        step += 1;
    }

    if let Err(reason) = sim.finish() {
        events.dump_failure(&reason);
        return Err(reason);
    }

    tracing::info!(
        steps = step,
        time_ms = scheduler.now_ms,
        callers = config.callers,
        slots = config.slots(),
        "complete"
    );
    for slot in sim.slots.iter().filter_map(|slot| slot.path.as_ref()) {
        let _ = fs::remove_file(slot);
    }
    Ok(())
}

fn next_op(caller: &Caller, slots: usize, config: &SimConfig, rng: &mut ChaCha8Rng) -> Op {
    if rng.random::<f64>() < config.sleep_rate {
        return Op::Sleep(rng.random_range(1..=50));
    }
    if caller.pending.len() >= config.max_pending {
        return Op::Await;
    }

    let slot = rng.random_range(0..slots);
    let mut weights = vec![
        (Op::Open(slot), 0.08),
        (Op::Close(slot), config.close_rate),
        (Op::Insert(slot), 0.30),
        (Op::Update(slot), 0.10),
        (Op::Count(slot), 0.15),
        (Op::Batch(slot, rng.random_range(1..=5)), config.batch_rate),
        (Op::ToggleEncoding, config.options_rate),
    ];
    if !caller.pending.is_empty() {
        weights.push((Op::Await, 0.25));
    }
    choose_weighted(&weights, rng)
}

fn choose_weighted(items: &[(Op, f64)], rng: &mut ChaCha8Rng) -> Op {
    let total: f64 = items.iter().map(|(_, weight)| weight.max(0.0)).sum();
    if total <= f64::EPSILON {
        return items.first().map_or(Op::Sleep(1), |(op, _)| *op);
    }
    let mut target = rng.random::<f64>() * total;
    for (op, weight) in items {
        let w = weight.max(0.0);
        if target <= w {
            return *op;
        }
        target -= w;
    }
    items.last().map_or(Op::Sleep(1), |(op, _)| *op)
}

impl Sim {
    fn apply(&mut self, caller: usize, op: Op) -> Result<String, String> {
        match op {
            Op::Open(slot) => self.open(slot),
            Op::Close(slot) => self.close(slot),
            Op::Insert(slot) => self.submit_insert(caller, slot),
            Op::Update(slot) => self.submit_update(caller, slot),
            Op::Count(slot) => self.submit_count(caller, slot),
            Op::Batch(slot, inserts) => self.submit_batch(caller, slot, inserts),
            Op::ToggleEncoding => {
                self.map_list = !self.map_list;
                self.broker.set_options(&OptionsUpdate {
                    query_as_map_list: Some(self.map_list),
                    worker_priority: None,
                });
                Ok(format!("map_list={}", self.map_list))
            }
            Op::Await => self.await_oldest(caller),
            Op::Sleep(_) => Ok(String::new()),
        }
    }

    fn open(&mut self, index: usize) -> Result<String, String> {
        let slot = &self.slots[index];
        let request = match &slot.path {
            Some(path) => OpenRequest::new(path.as_path()),
            None => OpenRequest::in_memory(),
        };
        let outcome = self
            .broker
            .open_database(request)
            .map_err(|err| format!("open {} failed: {err}", slot.label()))?;

        match (slot.session, slot.path.is_some()) {
            (Some(current), true) => {
                if outcome.id != current || !outcome.recovered {
                    return Err(format!(
                        "reopen of {} gave {outcome:?}, expected reuse of {current}",
                        slot.label()
                    ));
                }
                Ok(format!("reused={current}"))
            }
            (Some(current), false) => {
                // in-memory databases are never shared; drop the extra one again
                if outcome.id == current || outcome.recovered {
                    return Err(format!("in-memory open reused {current}: {outcome:?}"));
                }
                self.broker
                    .close_database(outcome.id)
                    .map_err(|err| format!("close of extra in-memory {} failed: {err}", outcome.id))?;
                self.oracle.session_closed(outcome.id);
                Ok(format!("extra={}", outcome.id))
            }
            (None, _) => {
                if outcome.recovered {
                    return Err(format!("fresh open of {} was recovered", slot.label()));
                }
                let rows = self.prepare(outcome.id)?;
                let slot = &mut self.slots[index];
                slot.session = Some(outcome.id);
                slot.last_session = Some(outcome.id);
                slot.submitted = 0;
                slot.rows = rows;
                Ok(format!("opened={} rows={rows}", outcome.id))
            }
        }
    }

    /// Create the table if needed and read back how many rows it holds.
    fn prepare(&self, id: SessionId) -> Result<i64, String> {
        self.broker
            .execute(id, SqlCommand::from(CREATE_TABLE))
            .wait()
            .map_err(|err| format!("create table on {id} failed: {err}"))?;
        let result = self
            .broker
            .query(id, count_command())
            .wait()
            .map_err(|err| format!("row count on {id} failed: {err}"))?;
        count_of(&result).ok_or_else(|| format!("row count on {id} unreadable: {result:?}"))
    }

    fn close(&mut self, index: usize) -> Result<String, String> {
        let slot = &mut self.slots[index];
        match (slot.session.take(), slot.last_session) {
            (Some(id), _) => {
                self.broker
                    .close_database(id)
                    .map_err(|err| format!("close of {id} failed: {err}"))?;
                self.oracle.session_closed(id);
                Ok(format!("closed={id}"))
            }
            (None, Some(id)) => match self.broker.close_database(id) {
                Err(err) if err.kind() == ErrorKind::DatabaseClosed => Ok(format!("already={id}")),
                other => Err(format!("second close of {id} gave {other:?}")),
            },
            (None, None) => Ok("never-opened".to_string()),
        }
    }

    /// The session to aim work at, with the next sequence number when it is still open.
    fn target(&mut self, index: usize) -> Option<(SessionId, Option<u64>)> {
        let slot = &mut self.slots[index];
        match slot.session {
            Some(id) => Some((id, Some(slot.next_seq()))),
            None => slot.last_session.map(|id| (id, None)),
        }
    }

    fn submit_insert(&mut self, caller: usize, index: usize) -> Result<String, String> {
        let Some((id, seq)) = self.target(index) else {
            return Ok("no-session".to_string());
        };
        let expect = match seq {
            Some(_) => {
                self.slots[index].rows += 1;
                Expect::RowId(self.slots[index].rows)
            }
            None => Expect::Closed,
        };
        let reply = self.broker.insert(id, insert_command(caller), false);
        Ok(self.push(caller, id, seq, expect, PendingReply::Insert(reply)))
    }

    fn submit_update(&mut self, caller: usize, index: usize) -> Result<String, String> {
        let Some((id, seq)) = self.target(index) else {
            return Ok("no-session".to_string());
        };
        let expect = match seq {
            Some(_) => Expect::Changes(u64::try_from(self.slots[index].rows).unwrap_or(0)),
            None => Expect::Closed,
        };
        let reply = self.broker.update(id, SqlCommand::from(TOUCH), false);
        Ok(self.push(caller, id, seq, expect, PendingReply::Update(reply)))
    }

    fn submit_count(&mut self, caller: usize, index: usize) -> Result<String, String> {
        let Some((id, seq)) = self.target(index) else {
            return Ok("no-session".to_string());
        };
        let expect = match seq {
            Some(_) => Expect::Count {
                rows: self.slots[index].rows,
                map_list: self.map_list,
            },
            None => Expect::Closed,
        };
        let reply = self.broker.query(id, count_command());
        Ok(self.push(caller, id, seq, expect, PendingReply::Count(reply)))
    }

    fn submit_batch(&mut self, caller: usize, index: usize, inserts: usize) -> Result<String, String> {
        let Some((id, seq)) = self.target(index) else {
            return Ok("no-session".to_string());
        };
        let mut operations: Vec<BatchOperation> = (0..inserts)
            .map(|_| BatchOperation::insert(insert_command(caller)))
            .collect();
        operations.push(BatchOperation::query(count_command()));

        let expect = match seq {
            Some(_) => {
                let slot = &mut self.slots[index];
                let row_ids = (0..inserts)
                    .map(|_| {
                        slot.rows += 1;
                        slot.rows
                    })
                    .collect();
                Expect::Batch {
                    row_ids,
                    rows: slot.rows,
                }
            }
            None => Expect::Closed,
        };
        let reply = self.broker.batch(id, BatchRequest::new(operations));
        Ok(self.push(caller, id, seq, expect, PendingReply::Batch(reply)))
    }

    fn push(
        &mut self,
        caller: usize,
        session: SessionId,
        seq: Option<u64>,
        expect: Expect,
        reply: PendingReply,
    ) -> String {
        let label = format!("session={session} expect={expect:?}");
        self.callers[caller].pending.push_back(Pending {
            unit: Submitted {
                session,
                seq: seq.unwrap_or(0),
                expect,
            },
            reply,
        });
        label
    }

    fn await_oldest(&mut self, caller: usize) -> Result<String, String> {
        let Some(pending) = self.callers[caller].pending.pop_front() else {
            return Ok("idle".to_string());
        };
        self.settle(pending)
    }

    fn settle(&mut self, pending: Pending) -> Result<String, String> {
        let Pending { unit, reply } = pending;
        let outcome = resolve(reply);
        self.oracle.check_reply(&unit, &outcome)?;
        Ok(format!(
            "session={} seq={} outcome={}",
            unit.session,
            unit.seq,
            match &outcome {
                Ok(_) => "ok".to_string(),
                Err(err) => err.to_string(),
            }
        ))
    }

    /// Await every outstanding reply, close whatever is still open and expect an idle
    /// registry.
    fn finish(&mut self) -> Result<(), String> {
        for caller in 0..self.callers.len() {
            while let Some(pending) = self.callers[caller].pending.pop_front() {
                self.settle(pending)?;
            }
        }
        for index in 0..self.slots.len() {
            self.close(index)?;
        }
        let snapshot = self.broker.registry_snapshot();
        Oracle::check_registry(&self.slots, &snapshot)?;
        if snapshot.worker_running {
            return Err("worker still running after every session closed".to_string());
        }
        Ok(())
    }
}

fn insert_command(caller: usize) -> SqlCommand {
    SqlCommand::new(
        INSERT,
        vec![CellValue::Integer(i64::try_from(caller).unwrap_or(i64::MAX))],
    )
}

fn count_command() -> SqlCommand {
    SqlCommand::new(COUNT, vec![CellValue::Integer(0)])
}
