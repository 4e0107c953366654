//! Contract bindings for the lending protocol.
//!
//! Only the call surface the SDK encodes against is declared here; contract
//! logic stays on-chain.

use alloy::sol;

sol! {
    /// One entry of a multicall batch
    #[derive(Debug, PartialEq, Eq)]
    struct MulticallAction {
        address target;
        bool isPriceUpdate;
        bytes data;
    }

    /// Batch entry point exposed by market tokens
    interface IMulticall {
        function multicall(MulticallAction[] calldata calls) external returns (bytes[] memory results);
    }
}

sol! {
    /// Collateral market token (ERC4626-style vault)
    #[sol(rpc)]
    interface ICToken {
        function deposit(uint256 assets, address receiver) external returns (uint256 shares);
        function redeem(uint256 shares, address receiver, address owner) external returns (uint256 assets);
        function balanceOf(address account) external view returns (uint256);
        function convertToAssets(uint256 shares) external view returns (uint256);
        function convertToShares(uint256 assets) external view returns (uint256);
        function asset() external view returns (address);
        function decimals() external view returns (uint8);
    }

    /// Market token that can also be borrowed from
    #[sol(rpc)]
    interface IBorrowableCToken {
        function borrow(uint256 assets, address receiver) external;
        function repay(uint256 assets) external;
        function debtBalance(address account) external view returns (uint256);
    }
}

sol! {
    /// Swap instruction executed by the zapper and position manager
    #[derive(Debug, PartialEq, Eq)]
    struct Swap {
        address inputToken;
        uint256 inputAmount;
        address outputToken;
        address target;
        uint256 slippage;
        bytes call;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct LeverageAction {
        address borrowableCToken;
        uint256 borrowAssets;
        address cToken;
        Swap swapAction;
        uint256 expectedShares;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct DeleverageAction {
        address cToken;
        uint256 collateralAssets;
        address borrowableCToken;
        uint256 repayAssets;
        Swap[] swapActions;
    }

    /// Swap-then-deposit helper
    interface IZapper {
        function swapAndDeposit(
            address cToken,
            bool depositAsWrappedNative,
            Swap[] calldata swaps,
            uint256 expectedShares,
            address receiver
        ) external payable returns (uint256);
    }

    /// Leverage and deleverage in one transaction
    interface IPositionManagement {
        function leverage(LeverageAction calldata action, uint256 slippage) external;
        function deleverage(DeleverageAction calldata action, uint256 slippage) external;
    }
}

sol! {
    /// Push-oracle adapter; the signed price payload is appended to the calldata
    interface IPushOracleAdapter {
        function writePrice(address asset, bool inUSD, uint256 timestamp) external;
    }
}

sol! {
    /// Standard ERC20 interface (subset)
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }
}
