use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use swarmsim_core::{
    BasicBot, Controller, ControllerInput, ControllerOutput, Message, MotorCommand, Pose,
    RobotId, SwarmConfig, World,
};

/// Cheap deterministic controller: drive, occasionally turn, always beacon.
struct BenchBot {
    counter: u32,
}

impl Controller for BenchBot {
    fn kind(&self) -> &'static str {
        "bench.bot"
    }

    fn step(&mut self, _input: &ControllerInput<'_>) -> ControllerOutput {
        self.counter = self.counter.wrapping_add(1);
        let motor = if self.counter % 16 == 0 {
            MotorCommand::TurnLeft
        } else {
            MotorCommand::Straight
        };
        ControllerOutput {
            motor,
            outgoing: Some(Message::tagged((self.counter % 251) as u8)),
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn build_world(robot_count: usize) -> World {
    let config = SwarmConfig {
        rng_seed: Some(0xBEEF),
        ..SwarmConfig::default()
    };
    let columns = (robot_count as f32).sqrt().ceil() as usize;
    let mut world = World::new(config).expect("bench world");
    for index in 0..robot_count {
        let col = index % columns;
        let row = index / columns;
        let handle = BasicBot::new(
            RobotId(index as u32 + 1),
            Pose::new(
                60.0 + col as f32 * 70.0,
                60.0 + row as f32 * 70.0,
                0.37 * index as f32,
            ),
            Box::new(BenchBot { counter: index as u32 }),
        )
        .into_handle();
        world.add_robot(&handle);
    }
    world
}

fn bench_world_step(c: &mut Criterion) {
    let robot_count = env_usize("SWARMSIM_BENCH_ROBOTS", 120);
    let ticks = env_usize("SWARMSIM_BENCH_TICKS", 32);

    let mut group = c.benchmark_group("world_step");
    group.bench_function(format!("{robot_count}_robots_{ticks}_ticks"), |bencher| {
        bencher.iter(|| {
            let mut world = build_world(robot_count);
            for _ in 0..ticks {
                black_box(world.step());
            }
            black_box(world.tick())
        });
    });
    group.finish();
}

criterion_group!(benches, bench_world_step);
criterion_main!(benches);
