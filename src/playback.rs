//! Plan playback against an input surface
//!
//! The synthesizers only produce plans. Hosts drive a browser (or anything
//! else that accepts pointer, keyboard and wheel input) by implementing the
//! surface traits below and handing plans to a [`Player`], which performs each
//! step and then waits out the step's delay.
//!
//! Waits go through [`sleep_cancellable`], so cancelling the player's token
//! stops playback at the next step or sleep segment.

use crate::cancel::{sleep_cancellable, CancellationToken};
use crate::error::GovernError;
use crate::types::{
    AttentionAction, AttentionPlan, KeyAction, Point, ScrollPlan, Trajectory, TypingPlan,
};
use async_trait::async_trait;
use tracing::debug;

/// Pointer input
#[async_trait]
pub trait PointerSurface: Send {
    async fn move_to(&mut self, point: Point) -> Result<(), GovernError>;

    /// Click at the current pointer position
    async fn click(&mut self) -> Result<(), GovernError>;
}

/// Keyboard input
#[async_trait]
pub trait KeyboardSurface: Send {
    async fn input_char(&mut self, c: char) -> Result<(), GovernError>;

    async fn delete_backward(&mut self) -> Result<(), GovernError>;
}

/// Wheel input
#[async_trait]
pub trait ScrollSurface: Send {
    async fn scroll_by(&mut self, dx: i32, dy: i32) -> Result<(), GovernError>;
}

/// Executes plans step by step with their embedded timing
#[derive(Debug, Clone, Default)]
pub struct Player {
    token: CancellationToken,
}

impl Player {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub async fn play_trajectory<S>(
        &self,
        surface: &mut S,
        trajectory: &Trajectory,
    ) -> Result<(), GovernError>
    where
        S: PointerSurface + ?Sized,
    {
        for step in &trajectory.steps {
            self.token.check()?;
            surface.move_to(step.point).await?;
            sleep_cancellable(step.hold, &self.token).await?;
        }
        Ok(())
    }

    /// Move along `trajectory` and click where it ends
    pub async fn play_click<S>(
        &self,
        surface: &mut S,
        trajectory: &Trajectory,
    ) -> Result<(), GovernError>
    where
        S: PointerSurface + ?Sized,
    {
        self.play_trajectory(surface, trajectory).await?;
        self.token.check()?;
        surface.click().await
    }

    pub async fn play_typing<S>(
        &self,
        surface: &mut S,
        plan: &TypingPlan,
    ) -> Result<(), GovernError>
    where
        S: KeyboardSurface + ?Sized,
    {
        debug!(wpm = plan.wpm, keystrokes = plan.keystrokes.len(), "typing");
        for stroke in &plan.keystrokes {
            self.token.check()?;
            match stroke.action {
                KeyAction::Emit(c) => surface.input_char(c).await?,
                KeyAction::DeleteBackward => surface.delete_backward().await?,
            }
            sleep_cancellable(stroke.delay, &self.token).await?;
        }
        Ok(())
    }

    /// Zero-delta steps (think time, pauses) only wait
    pub async fn play_scroll<S>(
        &self,
        surface: &mut S,
        plan: &ScrollPlan,
    ) -> Result<(), GovernError>
    where
        S: ScrollSurface + ?Sized,
    {
        for step in &plan.steps {
            self.token.check()?;
            if step.delta != 0 {
                surface.scroll_by(0, step.delta).await?;
            }
            sleep_cancellable(step.delay, &self.token).await?;
        }
        Ok(())
    }

    pub async fn play_attention<S>(
        &self,
        surface: &mut S,
        plan: &AttentionPlan,
    ) -> Result<(), GovernError>
    where
        S: PointerSurface + ?Sized,
    {
        debug!(kind = ?plan.kind, "attention behavior");
        for action in &plan.actions {
            match action {
                AttentionAction::Move { trajectory } => {
                    self.play_trajectory(surface, trajectory).await?
                }
                AttentionAction::Dwell { duration } => {
                    sleep_cancellable(*duration, &self.token).await?
                }
            }
        }
        Ok(())
    }
}
