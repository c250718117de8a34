use crate::client::Client;
use crate::log::LogRecord;
use crate::service::ServiceInfo;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Ticks between refreshes (ticks are 250 ms).
const REFRESH_TICKS: u8 = 4;

pub struct App {
    client: Client,
    pub services: Vec<ServiceInfo>,
    pub selected: usize,
    /// Tail of the selected service's log.
    pub log: Vec<LogRecord>,
    pub message: Option<String>,
    ticks: u8,
}

impl App {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            services: Vec::new(),
            selected: 0,
            log: Vec::new(),
            message: None,
            ticks: 0,
        }
    }

    pub async fn refresh(&mut self) {
        match self.client.services().await {
            Ok((names, _)) => {
                let mut infos = Vec::with_capacity(names.len());
                for name in &names {
                    if let Ok((info, _)) = self.client.service(name).await {
                        infos.push(info);
                    }
                }
                self.services = infos;
                if self.selected >= self.services.len() {
                    self.selected = self.services.len().saturating_sub(1);
                }
                self.message = None;
            }
            Err(e) => {
                self.message = Some(format!("connection error: {}", e));
            }
        }
        self.log = match self.selected_name() {
            Some(name) => match self.client.service_log(&name).await {
                Ok(records) => records,
                Err(_) => Vec::new(),
            },
            None => Vec::new(),
        };
    }

    pub async fn on_tick(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks % REFRESH_TICKS == 0 {
            self.refresh().await;
        }
    }

    fn selected_name(&self) -> Option<String> {
        self.services.get(self.selected).map(|s| s.name.clone())
    }

    /// Returns false when the user quits.
    pub async fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return false;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
                self.refresh().await;
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.services.len() {
                    self.selected += 1;
                }
                self.refresh().await;
            }
            KeyCode::Char('e') => self.run_op("enable").await,
            KeyCode::Char('d') => self.run_op("disable").await,
            KeyCode::Char('r') => self.run_op("restart").await,
            KeyCode::Char('c') => self.run_op("clear").await,
            _ => {}
        }
        true
    }

    async fn run_op(&mut self, op: &str) {
        let Some(name) = self.selected_name() else {
            return;
        };
        let result = match op {
            "enable" => self.client.enable(&name).await,
            "disable" => self.client.disable(&name).await,
            "restart" => self.client.restart(&name).await,
            "clear" => self.client.clear(&name).await,
            _ => return,
        };
        match result {
            Ok(()) => self.refresh().await,
            Err(e) => self.message = Some(format!("{} {}: {}", op, name, e)),
        }
    }
}
