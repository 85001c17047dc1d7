use log::info;
use rand::Rng;
use shared::{
    ClientInput, EntityKind, EntityState, Snapshot, ARENA_HEIGHT, ARENA_WIDTH, MAX_PLAYER_SPEED,
};
use std::collections::HashMap;

/// Commands applied to the simulation between ticks
#[derive(Debug)]
pub enum GameCommand {
    AddPlayer { id: u32 },
    RemovePlayer { id: u32 },
    PlayerInput { id: u32, input: ClientInput },
}

#[derive(Debug, Clone)]
pub struct PlayerEntity {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub dir_x: f32,
    pub dir_y: f32,
}

impl PlayerEntity {
    fn new(id: u32, x: f32, y: f32) -> Self {
        Self {
            id,
            x,
            y,
            vel_x: 0.0,
            vel_y: 0.0,
            dir_x: 0.0,
            dir_y: 1.0,
        }
    }

    fn apply_input(&mut self, input: &ClientInput) {
        let (mut vx, mut vy) = (input.vel_x, input.vel_y);

        // Clients command velocity directly; cap it server-side
        let speed = (vx * vx + vy * vy).sqrt();
        if speed > MAX_PLAYER_SPEED {
            vx = vx / speed * MAX_PLAYER_SPEED;
            vy = vy / speed * MAX_PLAYER_SPEED;
        }

        self.vel_x = vx;
        self.vel_y = vy;
    }

    fn update(&mut self, dt: f32) {
        self.x += self.vel_x * dt;
        self.y += self.vel_y * dt;

        self.x = self.x.clamp(-ARENA_WIDTH / 2.0, ARENA_WIDTH / 2.0);
        self.y = self.y.clamp(-ARENA_HEIGHT / 2.0, ARENA_HEIGHT / 2.0);

        // Face the direction of travel; keep the last facing when idle
        let speed = (self.vel_x * self.vel_x + self.vel_y * self.vel_y).sqrt();
        if speed > f32::EPSILON {
            self.dir_x = self.vel_x / speed;
            self.dir_y = self.vel_y / speed;
        }
    }
}

/// Closed set of simulated entity variants, dispatched by `update`/`state`
#[derive(Debug, Clone)]
pub enum Entity {
    Player(PlayerEntity),
}

impl Entity {
    pub fn id(&self) -> u32 {
        match self {
            Entity::Player(p) => p.id,
        }
    }

    pub fn update(&mut self, dt: f32) {
        match self {
            Entity::Player(p) => p.update(dt),
        }
    }

    pub fn state(&self) -> EntityState {
        match self {
            Entity::Player(p) => EntityState {
                id: p.id,
                kind: EntityKind::Player,
                x: p.x,
                y: p.y,
                vel_x: p.vel_x,
                vel_y: p.vel_y,
                dir_x: p.dir_x,
                dir_y: p.dir_y,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameState {
    pub time: f32,
    entities: HashMap<u32, Entity>,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            time: 0.0,
            entities: HashMap::new(),
        }
    }

    pub fn apply_command(&mut self, cmd: GameCommand) {
        match cmd {
            GameCommand::AddPlayer { id } => self.add_player(id),
            GameCommand::RemovePlayer { id } => self.remove_player(id),
            GameCommand::PlayerInput { id, input } => self.apply_input(id, &input),
        }
    }

    pub fn add_player(&mut self, id: u32) {
        let mut rng = rand::thread_rng();
        let x = rng.gen_range(-ARENA_WIDTH / 4.0..ARENA_WIDTH / 4.0);
        let y = rng.gen_range(-ARENA_HEIGHT / 4.0..ARENA_HEIGHT / 4.0);

        let player = PlayerEntity::new(id, x, y);
        info!("Spawned player {} at ({:.1}, {:.1})", id, x, y);
        self.entities.insert(id, Entity::Player(player));
    }

    pub fn remove_player(&mut self, id: u32) {
        if self.entities.remove(&id).is_some() {
            info!("Despawned player {}", id);
        }
    }

    /// Latest input wins; it takes effect on the next `step`.
    pub fn apply_input(&mut self, id: u32, input: &ClientInput) {
        if let Some(Entity::Player(player)) = self.entities.get_mut(&id) {
            player.apply_input(input);
        }
    }

    pub fn step(&mut self, dt: f32) {
        self.time += dt;
        for entity in self.entities.values_mut() {
            entity.update(dt);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut entities: Vec<EntityState> =
            self.entities.values().map(|e| e.state()).collect();
        // Stable wire order regardless of map iteration
        entities.sort_by_key(|e| e.id);

        Snapshot {
            time: self.time,
            entities,
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
